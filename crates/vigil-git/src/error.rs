//! Error types for git operations.

use std::path::PathBuf;

use vigil_core::{CommandError, Recoverable};

/// Failures of clone, `ls-remote`, fetch, reset and clean.
#[derive(Debug, thiserror::Error)]
pub enum GitOperationError {
    /// git could not be run, or was killed on timeout.
    #[error("git {operation} failed: {source}")]
    Command {
        /// The git operation
        operation: &'static str,
        /// Underlying runner error
        #[source]
        source: CommandError,
    },

    /// git exited non-zero.
    #[error("git {operation} exited with {code}: {stderr}")]
    Failed {
        /// The git operation
        operation: &'static str,
        /// Exit code, or `signal` if killed
        code: String,
        /// Tail of the captured output
        stderr: String,
    },

    /// `ls-remote` returned nothing for the branch.
    #[error("remote has no branch '{branch}'")]
    BranchNotFound {
        /// The missing branch
        branch: String,
    },

    /// SSH auth is configured but no usable key exists.
    #[error("ssh key unavailable: {reason}")]
    SshKeyMissing {
        /// What is missing
        reason: String,
    },

    /// A branch name that cannot be passed to git safely.
    #[error("invalid branch name '{name}': {reason}")]
    InvalidRef {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Filesystem failure around the working copy.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Output that could not be understood.
    #[error("unexpected git {operation} output: {output}")]
    UnexpectedOutput {
        /// The git operation
        operation: &'static str,
        /// What git printed
        output: String,
    },
}

impl GitOperationError {
    /// Creates a Command error.
    pub fn command(operation: &'static str, source: CommandError) -> Self {
        Self::Command { operation, source }
    }

    /// Creates an Io error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an SshKeyMissing error.
    pub fn ssh_key_missing(reason: impl Into<String>) -> Self {
        Self::SshKeyMissing {
            reason: reason.into(),
        }
    }
}

impl Recoverable for GitOperationError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Command { source, .. } => source.is_recoverable(),
            Self::Failed { .. } | Self::Io { .. } | Self::UnexpectedOutput { .. } => true,
            Self::BranchNotFound { .. } | Self::SshKeyMissing { .. } | Self::InvalidRef { .. } => {
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = GitOperationError::BranchNotFound {
            branch: "feature/x".to_string(),
        };
        assert_eq!(err.to_string(), "remote has no branch 'feature/x'");

        let err = GitOperationError::Failed {
            operation: "fetch",
            code: "128".to_string(),
            stderr: "fatal: could not read from remote".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "git fetch exited with 128: fatal: could not read from remote"
        );
    }

    #[test]
    fn test_recoverability() {
        let timeout = GitOperationError::command(
            "clone",
            CommandError::TimedOut {
                program: "git".to_string(),
                timeout: Duration::from_secs(60),
            },
        );
        let missing = GitOperationError::command(
            "clone",
            CommandError::NotFound {
                program: "git".to_string(),
            },
        );

        assert!(timeout.is_recoverable());
        assert!(!missing.is_recoverable());
        assert!(!GitOperationError::ssh_key_missing("no key configured").is_recoverable());
        assert!(
            !GitOperationError::BranchNotFound {
                branch: "main".to_string()
            }
            .is_recoverable()
        );
    }
}
