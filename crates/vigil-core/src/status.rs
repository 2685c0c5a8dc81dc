//! Reconciliation status model.
//!
//! The serialized form of [`StatusSnapshot`] is the status document served to
//! clients and persisted to disk: repository name → `branches` → branch name →
//! `targets` → target name.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Git sync state of a branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Not doing anything.
    #[default]
    Idle,
    /// Comparing local and remote commits.
    Checking,
    /// Updating the working copy.
    Pulling,
    /// The last pass failed.
    Error,
}

impl SyncStatus {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Pulling => "pulling",
            Self::Error => "error",
        }
    }
}

/// Deployment state of a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// Queued for deployment.
    #[default]
    Pending,
    /// `compose up` in progress.
    Deploying,
    /// Deployed and running.
    Success,
    /// Deployment failed.
    Error,
    /// Deployment disabled for this target.
    Skipped,
}

impl TargetStatus {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one deploy target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    /// Target name.
    pub name: String,
    /// Set when the target last transitioned into `success`.
    #[serde(default)]
    pub last_deploy_time: Option<DateTime<Utc>>,
    /// Current status.
    #[serde(default)]
    pub status: TargetStatus,
    /// Human readable detail.
    #[serde(default)]
    pub message: String,
}

impl TargetState {
    /// Creates a pending target.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_deploy_time: None,
            status: TargetStatus::Pending,
            message: String::new(),
        }
    }
}

/// Status of one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    /// Branch name.
    pub branch_name: String,
    /// When the last pass started.
    #[serde(default)]
    pub last_check_time: Option<DateTime<Utc>>,
    /// Short commit hash, `unknown` before the first pass.
    #[serde(default = "unknown_commit")]
    pub commit_hash: String,
    /// Git sync state.
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Targets keyed by name.
    #[serde(default)]
    pub targets: IndexMap<String, TargetState>,
}

fn unknown_commit() -> String {
    "unknown".to_string()
}

impl BranchState {
    /// Creates an idle branch with no targets.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            branch_name: name.into(),
            last_check_time: None,
            commit_hash: unknown_commit(),
            sync_status: SyncStatus::Idle,
            targets: IndexMap::new(),
        }
    }
}

/// Status of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    /// Repository name.
    pub repo_name: String,
    /// Branches keyed by name.
    #[serde(default)]
    pub branches: IndexMap<String, BranchState>,
}

impl RepoState {
    /// Creates a repository with no branches.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            repo_name: name.into(),
            branches: IndexMap::new(),
        }
    }
}

/// The full status document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    repos: IndexMap<String, RepoState>,
}

impl StatusSnapshot {
    /// Returns all repositories.
    pub fn repos(&self) -> &IndexMap<String, RepoState> {
        &self.repos
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Looks up a branch.
    pub fn branch(&self, repo: &str, branch: &str) -> Option<&BranchState> {
        self.repos.get(repo)?.branches.get(branch)
    }

    /// Looks up a target.
    pub fn target(&self, repo: &str, branch: &str, target: &str) -> Option<&TargetState> {
        self.branch(repo, branch)?.targets.get(target)
    }

    pub(crate) fn repos_mut(&mut self) -> &mut IndexMap<String, RepoState> {
        &mut self.repos
    }

    /// Returns the branch, creating the repository and branch entries if needed.
    pub(crate) fn branch_entry(&mut self, repo: &str, branch: &str) -> &mut BranchState {
        self.repos
            .entry(repo.to_string())
            .or_insert_with(|| RepoState::new(repo))
            .branches
            .entry(branch.to_string())
            .or_insert_with(|| BranchState::new(branch))
    }

    pub(crate) fn branch_mut(&mut self, repo: &str, branch: &str) -> Option<&mut BranchState> {
        self.repos.get_mut(repo)?.branches.get_mut(branch)
    }
}

/// The mutable fields of a [`BranchState`].
///
/// Unset fields are left untouched when the patch is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchPatch {
    sync_status: Option<SyncStatus>,
    commit_hash: Option<String>,
    last_check_time: Option<DateTime<Utc>>,
}

impl BranchPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sync status.
    pub fn sync_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    /// Sets the commit hash.
    pub fn commit_hash(mut self, hash: impl Into<String>) -> Self {
        self.commit_hash = Some(hash.into());
        self
    }

    /// Sets the last check time.
    pub fn last_check_time(mut self, time: DateTime<Utc>) -> Self {
        self.last_check_time = Some(time);
        self
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.sync_status.is_none() && self.commit_hash.is_none() && self.last_check_time.is_none()
    }

    /// Applies the set fields to `state`.
    pub fn apply(&self, state: &mut BranchState) {
        if let Some(status) = self.sync_status {
            state.sync_status = status;
        }
        if let Some(hash) = &self.commit_hash {
            state.commit_hash = hash.clone();
        }
        if let Some(time) = self.last_check_time {
            state.last_check_time = Some(time);
        }
    }
}
