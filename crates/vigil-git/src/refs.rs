//! Branch references and commit hashes.

use std::fmt;

use crate::error::GitOperationError;

/// Length of the abbreviated hash recorded in status.
pub const SHORT_HASH_LEN: usize = 7;

/// A validated branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchRef(String);

impl BranchRef {
    /// Validates `name` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns `GitOperationError::InvalidRef` for names git would reject or
    /// that could be read as a command-line option.
    pub fn new(name: impl Into<String>) -> Result<Self, GitOperationError> {
        let name = name.into();
        match check_branch_name(&name) {
            Ok(()) => Ok(Self(name)),
            Err(reason) => Err(GitOperationError::InvalidRef { name, reason }),
        }
    }

    /// The branch name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// `refs/heads/<branch>`, the exact ref queried with `ls-remote`.
    pub fn full_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// `origin/<branch>`, the reset target after a fetch.
    pub fn remote_tracking(&self) -> String {
        format!("origin/{}", self.0)
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_branch_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("branch name cannot be empty");
    }

    if name.starts_with('-') {
        return Err("branch name cannot start with '-'");
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err("branch name cannot start or end with '/'");
    }

    if name.contains("..") {
        return Err("branch name cannot contain '..'");
    }

    if name.contains("//") {
        return Err("branch name cannot contain '//'");
    }

    if name.contains("@{") || name.ends_with(".lock") || name.ends_with('.') {
        return Err("branch name is not a valid ref");
    }

    for c in name.chars() {
        if c.is_control()
            || c == ' '
            || c == '~'
            || c == '^'
            || c == ':'
            || c == '?'
            || c == '*'
            || c == '['
            || c == '\\'
        {
            return Err("branch name contains invalid characters");
        }
    }

    Ok(())
}

/// Returns the first [`SHORT_HASH_LEN`] characters of a commit hash.
pub fn short_hash(sha: &str) -> &str {
    let sha = sha.trim();
    sha.get(..SHORT_HASH_LEN).unwrap_or(sha)
}

/// Returns true for a full or abbreviated hex object name.
pub fn is_commit_hash(value: &str) -> bool {
    (4..=64).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Extracts the commit for `full_ref` from `git ls-remote` output.
///
/// Each line is `<sha>\t<ref>`. Returns `None` if the ref is absent.
pub fn parse_ls_remote(output: &str, full_ref: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let sha = fields.next()?;
        let name = fields.next()?;
        (name == full_ref && is_commit_hash(sha)).then(|| sha.to_string())
    })
}
