//! Error types for deployments.

use vigil_core::{CommandError, Recoverable};

/// Infrastructure failures that stop a deployment before `compose up`.
///
/// These are never retried within a pass; the target is marked `error` and the
/// next pass tries again.
#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    /// A required executable is not installed.
    #[error("executable '{program}' not found in PATH")]
    ExecutableNotFound {
        /// The missing program
        program: String,
    },

    /// `docker info` failed or timed out.
    #[error("docker daemon unavailable: {reason}")]
    DaemonUnavailable {
        /// What the probe reported
        reason: String,
    },

    /// Logging into a registry failed.
    #[error("registry login failed for {registry}: {reason}")]
    RegistryLogin {
        /// Registry address
        registry: String,
        /// Why it failed
        reason: String,
    },

    /// docker could not be run.
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl DeploymentError {
    /// Creates a DaemonUnavailable error.
    pub fn daemon_unavailable(reason: impl Into<String>) -> Self {
        Self::DaemonUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a RegistryLogin error.
    pub fn registry_login(registry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RegistryLogin {
            registry: registry.into(),
            reason: reason.into(),
        }
    }
}

impl Recoverable for DeploymentError {
    fn is_recoverable(&self) -> bool {
        false
    }
}
