//! Working copy operations.
//!
//! One working copy exists per (repository, branch) at
//! `<repo_base_path>/<repo>/<branch>`. Every git call goes through the
//! injected [`CommandRunner`]; the remote-facing ones (clone, `ls-remote`,
//! fetch/reset/clean) run under the [`RetryExecutor`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use vigil_core::{CommandOutput, CommandRunner, CommandSpec, RetryExecutor};

use crate::auth::GitAuth;
use crate::error::GitOperationError;
use crate::refs::{BranchRef, parse_ls_remote};

/// Maximum characters of git output kept in an error.
const ERROR_EXCERPT_CHARS: usize = 500;

/// A branch checkout on disk.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    path: PathBuf,
    remote_url: String,
    branch: BranchRef,
    auth: GitAuth,
}

impl WorkingCopy {
    /// Describes the checkout of `branch` from `remote_url` at `path`.
    ///
    /// # Errors
    ///
    /// Returns `GitOperationError::InvalidRef` if the branch name is unusable.
    pub fn new(
        path: impl Into<PathBuf>,
        remote_url: impl Into<String>,
        branch: &str,
        auth: GitAuth,
    ) -> Result<Self, GitOperationError> {
        Ok(Self {
            path: path.into(),
            remote_url: remote_url.into(),
            branch: BranchRef::new(branch)?,
            auth,
        })
    }

    /// Checkout directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Branch being tracked.
    pub fn branch(&self) -> &BranchRef {
        &self.branch
    }

    /// Returns true if a repository exists at the path.
    pub fn is_cloned(&self) -> bool {
        self.path.join(".git").exists()
    }
}

/// Runs git against working copies.
#[derive(Clone)]
pub struct GitClient {
    runner: Arc<dyn CommandRunner>,
    retry: RetryExecutor,
    timeout: Option<Duration>,
}

impl GitClient {
    /// Creates a client. `timeout` bounds each git subprocess.
    pub fn new(runner: Arc<dyn CommandRunner>, retry: RetryExecutor, timeout: Option<Duration>) -> Self {
        Self {
            runner,
            retry,
            timeout,
        }
    }

    /// Clones the working copy if it does not exist yet.
    ///
    /// Returns `true` if a clone happened. A failed attempt removes whatever it
    /// left behind, so the next attempt (or the next pass) starts clean.
    ///
    /// # Errors
    ///
    /// Returns the last clone error once retries are exhausted.
    #[instrument(skip(self, wc), fields(path = %wc.path.display(), branch = %wc.branch))]
    pub async fn ensure_cloned(&self, wc: &WorkingCopy) -> Result<bool, GitOperationError> {
        if wc.is_cloned() {
            debug!("Working copy already present");
            return Ok(false);
        }

        info!(url = %wc.remote_url, "Cloning repository");
        self.retry
            .run("git clone", || self.clone_once(wc))
            .await?;
        info!("Clone complete");
        Ok(true)
    }

    async fn clone_once(&self, wc: &WorkingCopy) -> Result<(), GitOperationError> {
        remove_dir_if_exists(&wc.path).await?;
        if let Some(parent) = wc.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GitOperationError::io(parent, e))?;
        }

        let spec = CommandSpec::new("git")
            .arg("clone")
            .arg("--branch")
            .arg(wc.branch.name())
            .arg("--")
            .arg(&wc.remote_url)
            .arg(wc.path.to_string_lossy());

        let result = self.run("clone", &wc.auth, spec).await;
        if result.is_err()
            && let Err(e) = remove_dir_if_exists(&wc.path).await
        {
            warn!(error = %e, "Failed to remove partial clone");
        }
        result.map(|_| ())
    }

    /// Returns the full hash of the branch tip on the remote.
    ///
    /// # Errors
    ///
    /// Returns `GitOperationError::BranchNotFound` if the remote has no such
    /// branch; other failures after retries are exhausted.
    #[instrument(skip(self, wc), fields(branch = %wc.branch))]
    pub async fn remote_head(&self, wc: &WorkingCopy) -> Result<String, GitOperationError> {
        let full_ref = wc.branch.full_ref();

        self.retry
            .run("git ls-remote", || async {
                let spec = CommandSpec::new("git")
                    .args(["ls-remote", "--"])
                    .arg(&wc.remote_url)
                    .arg(&full_ref);
                let spec = if wc.path.is_dir() {
                    spec.current_dir(&wc.path)
                } else {
                    spec
                };

                let output = self.run("ls-remote", &wc.auth, spec).await?;
                parse_ls_remote(&output.stdout, &full_ref).ok_or_else(|| {
                    GitOperationError::BranchNotFound {
                        branch: wc.branch.name().to_string(),
                    }
                })
            })
            .await
    }

    /// Returns the full hash of the local `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if `git rev-parse` fails or prints something unexpected.
    pub async fn local_head(&self, wc: &WorkingCopy) -> Result<String, GitOperationError> {
        let spec = CommandSpec::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(&wc.path);
        let output = self.run("rev-parse", &GitAuth::Anonymous, spec).await?;

        let sha = output.stdout.trim();
        if !crate::refs::is_commit_hash(sha) {
            return Err(GitOperationError::UnexpectedOutput {
                operation: "rev-parse",
                output: sha.to_string(),
            });
        }
        Ok(sha.to_string())
    }

    /// Brings the working copy to the remote tip, discarding local changes.
    ///
    /// Runs fetch, `reset --hard origin/<branch>` and `clean -fxd` (keeping
    /// `.env`) as one retried unit.
    ///
    /// # Errors
    ///
    /// Returns the last failure once retries are exhausted.
    #[instrument(skip(self, wc), fields(branch = %wc.branch))]
    pub async fn pull(&self, wc: &WorkingCopy) -> Result<(), GitOperationError> {
        self.retry
            .run("git pull", || async {
                let git = || CommandSpec::new("git").current_dir(&wc.path);

                self.run("fetch", &wc.auth, git().args(["fetch", "origin"])).await?;
                self.run(
                    "reset",
                    &GitAuth::Anonymous,
                    git().args(["reset", "--hard"]).arg(wc.branch.remote_tracking()),
                )
                .await?;
                self.run(
                    "clean",
                    &GitAuth::Anonymous,
                    git().args(["clean", "-fxd", "--exclude=.env"]),
                )
                .await?;
                Ok::<(), GitOperationError>(())
            })
            .await?;

        info!("Working copy reset to {}", wc.branch.remote_tracking());
        Ok(())
    }

    async fn run(
        &self,
        operation: &'static str,
        auth: &GitAuth,
        spec: CommandSpec,
    ) -> Result<CommandOutput, GitOperationError> {
        let spec = auth.apply(spec.timeout(self.timeout));
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| GitOperationError::command(operation, e))?;

        if !output.success() {
            return Err(GitOperationError::Failed {
                operation,
                code: output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr: output.failure_excerpt(ERROR_EXCERPT_CHARS),
            });
        }
        Ok(output)
    }
}

impl std::fmt::Debug for GitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitClient")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), GitOperationError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GitOperationError::io(path, e)),
    }
}
