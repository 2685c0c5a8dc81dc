//! Drift detection.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use vigil_core::DeployTarget;

use crate::docker::DockerCli;
use crate::project::project_name;

/// What docker reports for a target's compose project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActualState {
    /// At least one service is running.
    Running,
    /// No running services. A target that was never deployed looks the same.
    Stopped,
    /// The daemon probe failed.
    DaemonUnavailable,
    /// The check itself failed.
    ErrorCheck,
}

impl ActualState {
    /// Returns true if the target should be redeployed.
    pub fn needs_redeploy(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns the state as a string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::DaemonUnavailable => "daemon_unavailable",
            Self::ErrorCheck => "error_check",
        }
    }
}

impl fmt::Display for ActualState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks whether deployed targets are still running.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    docker: Arc<DockerCli>,
}

impl HealthChecker {
    /// Creates a checker using `docker`.
    pub fn new(docker: Arc<DockerCli>) -> Self {
        Self { docker }
    }

    /// Reports the actual state of `target`'s compose project.
    pub async fn check(&self, repo: &str, branch: &str, target: &DeployTarget, working_dir: &Path) -> ActualState {
        if !self.docker.daemon_available().await {
            return ActualState::DaemonUnavailable;
        }

        let project = project_name(repo, branch, &target.name);
        let state = match self
            .docker
            .compose_running_services(&project, &target.file, working_dir)
            .await
        {
            Ok(output) if !output.stdout.trim().is_empty() => ActualState::Running,
            Ok(output) if output.success() => ActualState::Stopped,
            Ok(output) => {
                warn!(
                    project = %project,
                    error = %output.failure_excerpt(200),
                    "Compose status check failed"
                );
                ActualState::ErrorCheck
            },
            Err(e) => {
                warn!(project = %project, error = %e, "Compose status check failed");
                ActualState::ErrorCheck
            },
        };

        debug!(project = %project, state = %state, "Target state checked");
        state
    }
}
