//! Compose project naming.

/// Compose project name for one target.
///
/// Both deploy and drift checks use this, so a target's containers are always
/// found under the project they were started with. The name is lower-cased and
/// anything other than `[a-z0-9_]` becomes `_`.
pub fn project_name(repo: &str, branch: &str, target: &str) -> String {
    format!("{}_{}_{}", repo, branch, target)
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect()
}
