//! Error types shared across VigilCD crates.
//!
//! Git and deployment errors live in their own crates; this module holds the
//! errors raised while loading configuration and while persisting status.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed or inconsistent configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration file could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A repository entry is invalid.
    #[error("invalid repository '{repo}': {reason}")]
    InvalidRepository {
        /// Name of the offending repository
        repo: String,
        /// Why it was rejected
        reason: String,
    },

    /// A setting is out of range.
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting {
        /// Dotted path of the setting
        field: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates an InvalidRepository error.
    pub fn invalid_repository(repo: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRepository {
            repo: repo.into(),
            reason: reason.into(),
        }
    }

    /// Creates an InvalidSetting error.
    pub fn invalid_setting(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while reading or writing the status snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Snapshot path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The snapshot could not be (de)serialized.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
