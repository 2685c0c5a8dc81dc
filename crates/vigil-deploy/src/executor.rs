//! Target deployment.
//!
//! A deployment runs these steps, recording progress in the [`StateStore`]:
//!
//! 1. Probe the docker daemon
//! 2. Validate the compose file's environment
//! 3. Mark the target `deploying`
//! 4. Log into the repository's private registries
//! 5. `docker compose up -d --remove-orphans`
//! 6. Log out of every registry logged into in step 4
//!
//! Subprocess failures end up in the target's message; nothing here returns
//! an error to the caller.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};
use vigil_core::{CommandError, DeployTarget, RepositoryConfig, StateStore, TargetStatus};

use crate::docker::DockerCli;
use crate::error::DeploymentError;
use crate::project::project_name;
use crate::validator::EnvironmentValidator;

/// Characters of compose output kept in a failed target's message.
const OUTPUT_EXCERPT_CHARS: usize = 500;

/// Characters kept from an unexpected error.
const UNEXPECTED_EXCERPT_CHARS: usize = 100;

/// Final result of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// compose up succeeded.
    Deployed,
    /// The target was left in `error`.
    Failed,
}

impl DeployOutcome {
    /// Returns the outcome as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deployed => "success",
            Self::Failed => "error",
        }
    }
}

/// Deploys compose targets.
#[derive(Debug, Clone)]
pub struct DeploymentExecutor {
    docker: Arc<DockerCli>,
    validator: Arc<EnvironmentValidator>,
    store: StateStore,
}

impl DeploymentExecutor {
    /// Creates an executor that records progress in `store`.
    pub fn new(docker: Arc<DockerCli>, validator: EnvironmentValidator, store: StateStore) -> Self {
        Self {
            docker,
            validator: Arc::new(validator),
            store,
        }
    }

    /// The docker CLI used for deployments.
    pub fn docker(&self) -> &Arc<DockerCli> {
        &self.docker
    }

    /// Deploys `target` from the working copy at `working_dir`.
    #[instrument(skip_all, fields(repo = %repo.name, branch = %branch, target = %target.name))]
    pub async fn deploy_target(
        &self,
        repo: &RepositoryConfig,
        branch: &str,
        working_dir: &Path,
        target: &DeployTarget,
    ) -> DeployOutcome {
        let record = |status: TargetStatus, message: String| {
            self.store
                .update_target(&repo.name, branch, &target.name, status, message);
        };

        if let Err(e) = self.docker.ensure_daemon().await {
            error!(error = %e, "Docker is not usable, skipping deployment");
            let message = match e {
                DeploymentError::ExecutableNotFound { .. } => "Docker executable not found".to_string(),
                DeploymentError::DaemonUnavailable { .. } => "Docker daemon unavailable".to_string(),
                other => format!("Unexpected error: {}", excerpt(&other.to_string())),
            };
            record(TargetStatus::Error, message);
            return DeployOutcome::Failed;
        }

        let compose_file = working_dir.join(&target.file);
        let report = self.validator.validate(&compose_file, working_dir);
        for note in &report.notes {
            info!(file = %target.file, "{}", note);
        }
        if !report.is_valid() {
            for warning in &report.warnings {
                warn!(file = %target.file, "{}", warning);
            }
            record(
                TargetStatus::Error,
                "Missing environment configuration".to_string(),
            );
            return DeployOutcome::Failed;
        }

        record(TargetStatus::Deploying, "Starting deployment...".to_string());

        let login = self.docker.login_registries(&repo.registries).await;
        if !login.succeeded() {
            record(
                TargetStatus::Error,
                "Docker registry login failed".to_string(),
            );
            self.docker.logout_registries(login.logged_in()).await;
            return DeployOutcome::Failed;
        }

        let project = project_name(&repo.name, branch, &target.name);
        let started = Instant::now();
        let result = self.docker.compose_up(&project, target, working_dir).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(output) if output.success() => {
                info!(project = %project, elapsed_ms = elapsed.as_millis() as u64, "Deployment succeeded");
                record(TargetStatus::Success, "Running".to_string());
                DeployOutcome::Deployed
            },
            Ok(output) => {
                let detail = output.failure_excerpt(OUTPUT_EXCERPT_CHARS);
                error!(project = %project, code = ?output.code, "Deployment failed");
                record(TargetStatus::Error, format!("Deployment error: {}", detail));
                DeployOutcome::Failed
            },
            Err(DeploymentError::Command(CommandError::TimedOut { timeout, .. })) => {
                error!(project = %project, timeout_secs = timeout.as_secs(), "Deployment timed out");
                record(
                    TargetStatus::Error,
                    format!("Timeout after {}s", timeout.as_secs()),
                );
                DeployOutcome::Failed
            },
            Err(e) => {
                error!(project = %project, error = %e, "Deployment could not run");
                record(
                    TargetStatus::Error,
                    format!("Unexpected error: {}", excerpt(&e.to_string())),
                );
                DeployOutcome::Failed
            },
        };

        self.docker.logout_registries(login.logged_in()).await;
        outcome
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(UNEXPECTED_EXCERPT_CHARS).collect()
}
