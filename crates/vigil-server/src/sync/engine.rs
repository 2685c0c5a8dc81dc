//! The reconciliation pass.
//!
//! One pass for a (repository, branch):
//!
//! 1. Mark the branch `checking`
//! 2. Clone the working copy if it is missing
//! 3. Read the remote tip with `ls-remote`
//! 4. Pull if the remote moved or the copy was just cloned
//! 5. Without a git change, ask docker whether every target is still running
//! 6. Deploy every target if git changed or drift was found
//!
//! Git failures mark the branch `error` and end the pass. A panic inside a
//! pass is contained in its own task and recorded the same way.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use vigil_core::{
    BranchConfig, BranchPatch, CommandRunner, HostCredentialResolver, RepositoryConfig, RetryExecutor, SecretProvider,
    Settings, StateStore, SyncStatus, TargetStatus,
};
use vigil_deploy::{
    DeploymentExecutor, DockerCli, DockerEndpoint, DockerTimeouts, EnvironmentValidator, HealthChecker,
};
use vigil_git::{GitAuth, GitClient, GitOperationError, WorkingCopy, short_hash};

use super::scheduler::Reconciler;
use crate::metrics::SyncMetrics;

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing changed and everything was running.
    InSync,
    /// Targets were deployed.
    Deployed,
    /// The branch was left in `error`.
    Failed,
}

impl PassOutcome {
    /// Returns the outcome as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InSync => "in_sync",
            Self::Deployed => "deployed",
            Self::Failed => "error",
        }
    }
}

struct EngineInner {
    settings: Arc<Settings>,
    store: StateStore,
    git: GitClient,
    deployer: DeploymentExecutor,
    health: HealthChecker,
    credentials: HostCredentialResolver,
    secrets: Arc<dyn SecretProvider>,
    metrics: SyncMetrics,
}

/// Reconciles configured branches against their remotes and docker.
#[derive(Clone)]
pub struct RepoSyncEngine {
    inner: Arc<EngineInner>,
}

impl RepoSyncEngine {
    /// Builds the engine and its git and docker clients.
    pub fn new(
        settings: Arc<Settings>,
        store: StateStore,
        runner: Arc<dyn CommandRunner>,
        secrets: Arc<dyn SecretProvider>,
        endpoint: DockerEndpoint,
    ) -> Self {
        Self::with_validator(settings, store, runner, secrets, endpoint, EnvironmentValidator::new())
    }

    /// Like [`RepoSyncEngine::new`], with an explicit environment validator.
    pub fn with_validator(
        settings: Arc<Settings>,
        store: StateStore,
        runner: Arc<dyn CommandRunner>,
        secrets: Arc<dyn SecretProvider>,
        endpoint: DockerEndpoint,
        validator: EnvironmentValidator,
    ) -> Self {
        let git = GitClient::new(
            runner.clone(),
            RetryExecutor::new(settings.retry_policy()),
            settings.deployment.git_timeout(),
        );

        let docker = Arc::new(DockerCli::new(
            runner,
            endpoint,
            secrets.clone(),
            DockerTimeouts {
                daemon: settings.deployment.daemon_timeout(),
                compose: settings.deployment.compose_timeout(),
            },
        ));

        let credentials = HostCredentialResolver::new(settings.secrets.git_host_keys(), secrets.clone());

        Self {
            inner: Arc::new(EngineInner {
                deployer: DeploymentExecutor::new(docker.clone(), validator, store.clone()),
                health: HealthChecker::new(docker),
                git,
                credentials,
                secrets,
                store,
                settings,
                metrics: SyncMetrics,
            }),
        }
    }

    /// The status store passes write to.
    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    /// Runs one pass in its own task.
    ///
    /// Never fails: errors and panics end up as branch `error` status.
    pub async fn run_pass(&self, repo: &str, branch: &str) -> PassOutcome {
        let inner = self.inner.clone();
        let (repo_name, branch_name) = (repo.to_string(), branch.to_string());

        self.inner.metrics.pass_started();
        let task = tokio::spawn(async move { inner.reconcile(&repo_name, &branch_name).await });
        let result = task.await;
        self.inner.metrics.pass_finished();

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(repo = %repo, branch = %branch, error = %e, "Reconciliation task aborted");
                self.inner.store.update_branch(
                    repo,
                    branch,
                    BranchPatch::new().sync_status(SyncStatus::Error),
                );
                PassOutcome::Failed
            },
        }
    }
}

#[async_trait]
impl Reconciler for RepoSyncEngine {
    async fn reconcile(&self, repo: &str, branch: &str) {
        self.run_pass(repo, branch).await;
    }
}

impl EngineInner {
    #[instrument(skip(self))]
    async fn reconcile(&self, repo: &str, branch: &str) -> PassOutcome {
        let Some(repo_config) = self.settings.repo(repo) else {
            warn!("Repository is not configured");
            return PassOutcome::Failed;
        };
        let Some(branch_config) = repo_config.branch(branch) else {
            warn!("Branch is not configured");
            return PassOutcome::Failed;
        };

        let started = Instant::now();

        let outcome = match self.sync(repo_config, branch_config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Git synchronization failed");
                self.store.update_branch(
                    repo,
                    branch,
                    BranchPatch::new().sync_status(SyncStatus::Error),
                );
                PassOutcome::Failed
            },
        };

        let elapsed = started.elapsed();
        self.metrics
            .record_reconciliation(repo, outcome.as_str(), elapsed);
        info!(
            outcome = outcome.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Reconciliation finished"
        );
        outcome
    }

    async fn sync(&self, repo: &RepositoryConfig, branch: &BranchConfig) -> Result<PassOutcome, GitOperationError> {
        let (repo_name, branch_name) = (repo.name.as_str(), branch.name.as_str());

        self.store.update_branch(
            repo_name,
            branch_name,
            BranchPatch::new()
                .sync_status(SyncStatus::Checking)
                .last_check_time(Utc::now()),
        );

        let auth = GitAuth::resolve(
            repo,
            &self.credentials,
            self.secrets.as_ref(),
            &self.settings.secrets.ssh_key_path_key,
        )?;
        let wc = WorkingCopy::new(
            self.settings.working_dir(repo_name, branch_name),
            &repo.url,
            branch_name,
            auth,
        )?;

        let cloned = self.git.ensure_cloned(&wc).await?;
        let remote = self.git.remote_head(&wc).await?;
        self.store.update_branch(
            repo_name,
            branch_name,
            BranchPatch::new().commit_hash(short_hash(&remote)),
        );

        let local = self.git.local_head(&wc).await?;
        let git_updated = cloned || local != remote;

        if git_updated {
            info!(
                local = %short_hash(&local),
                remote = %short_hash(&remote),
                cloned,
                "Remote changed, pulling"
            );
            self.store.update_branch(
                repo_name,
                branch_name,
                BranchPatch::new().sync_status(SyncStatus::Pulling),
            );
            self.git.pull(&wc).await?;
            let head = self.git.local_head(&wc).await?;
            self.store.update_branch(
                repo_name,
                branch_name,
                BranchPatch::new()
                    .sync_status(SyncStatus::Idle)
                    .commit_hash(short_hash(&head)),
            );
        } else {
            debug!(commit = %short_hash(&local), "Working copy is up to date");
            self.store.update_branch(
                repo_name,
                branch_name,
                BranchPatch::new().sync_status(SyncStatus::Idle),
            );
        }

        let deployment_required = !git_updated && self.drift_detected(repo, branch, &wc).await;

        if !git_updated && !deployment_required {
            return Ok(PassOutcome::InSync);
        }

        self.deploy_all(repo, branch, &wc).await;
        Ok(PassOutcome::Deployed)
    }

    /// Returns true at the first deployable target that is not running.
    ///
    /// Only `deploy: true` targets are checked. A `deploy: false` target is
    /// never started, so it would always read as stopped and force a redeploy
    /// on every pass.
    async fn drift_detected(&self, repo: &RepositoryConfig, branch: &BranchConfig, wc: &WorkingCopy) -> bool {
        for target in branch.targets.iter().filter(|t| t.deploy) {
            let state = self
                .health
                .check(&repo.name, &branch.name, target, wc.path())
                .await;
            if state.needs_redeploy() {
                info!(target = %target.name, state = %state, "Drift detected, redeploying");
                return true;
            }
        }
        false
    }

    async fn deploy_all(&self, repo: &RepositoryConfig, branch: &BranchConfig, wc: &WorkingCopy) {
        let (repo_name, branch_name) = (repo.name.as_str(), branch.name.as_str());

        for target in &branch.targets {
            let (status, message) = if target.deploy {
                (TargetStatus::Pending, "Waiting for deployment")
            } else {
                (TargetStatus::Skipped, "Deploy disabled")
            };
            self.store
                .update_target(repo_name, branch_name, &target.name, status, message);
        }

        for target in branch.targets.iter().filter(|t| t.deploy) {
            let started = Instant::now();
            let outcome = self
                .deployer
                .deploy_target(repo, branch_name, wc.path(), target)
                .await;
            self.metrics
                .record_deployment(repo_name, outcome.as_str(), started.elapsed());
        }
    }
}
