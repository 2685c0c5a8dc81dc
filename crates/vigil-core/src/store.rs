//! The status store.
//!
//! [`StateStore`] owns every [`BranchState`] and [`TargetState`]. Each mutation
//! runs under one lock that covers the map, the snapshot write and the fan-out,
//! so subscribers and the snapshot file always see fully applied updates in the
//! order they happened.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RepositoryConfig;
use crate::error::StoreError;
use crate::status::{BranchPatch, BranchState, StatusSnapshot, TargetState, TargetStatus};

/// Shared, cloneable handle to the reconciliation status.
#[derive(Debug, Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// Snapshot file. `None` keeps state in memory only.
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    snapshot: StatusSnapshot,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

impl StateStore {
    /// Opens a store persisted at `path`, loading the previous snapshot if one exists.
    ///
    /// A missing or unreadable snapshot starts the store empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match load_snapshot(&path) {
            Ok(Some(snapshot)) => {
                info!(
                    path = %path.display(),
                    repos = snapshot.repos().len(),
                    "Loaded status snapshot"
                );
                snapshot
            },
            Ok(None) => {
                debug!(path = %path.display(), "No status snapshot, starting empty");
                StatusSnapshot::default()
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable status snapshot");
                StatusSnapshot::default()
            },
        };

        Self::with_snapshot(Some(path), snapshot)
    }

    /// Creates a store that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_snapshot(None, StatusSnapshot::default())
    }

    fn with_snapshot(path: Option<PathBuf>, snapshot: StatusSnapshot) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                state: Mutex::new(StoreState {
                    snapshot,
                    ..Default::default()
                }),
            }),
        }
    }

    /// Returns the snapshot file path, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Applies `patch` to a branch, creating the repository and branch entries
    /// if this is the first time they are seen.
    pub fn update_branch(&self, repo: &str, branch: &str, patch: BranchPatch) {
        self.mutate(|snapshot| {
            patch.apply(snapshot.branch_entry(repo, branch));
            true
        });
    }

    /// Sets a target's status and message.
    ///
    /// Does nothing if the branch has never been recorded. Moving into
    /// [`TargetStatus::Success`] stamps `last_deploy_time`.
    pub fn update_target(
        &self,
        repo: &str,
        branch: &str,
        target: &str,
        status: TargetStatus,
        message: impl Into<String>,
    ) {
        let message = message.into();
        self.mutate(|snapshot| {
            let Some(branch_state) = snapshot.branch_mut(repo, branch) else {
                debug!(repo = %repo, branch = %branch, target = %target, "Target update for unknown branch ignored");
                return false;
            };

            let target_state = branch_state
                .targets
                .entry(target.to_string())
                .or_insert_with(|| TargetState::new(target));
            target_state.status = status;
            target_state.message = message;
            if status == TargetStatus::Success {
                target_state.last_deploy_time = Some(Utc::now());
            }
            true
        });
    }

    /// Returns a consistent copy of the whole status document.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.state.lock().snapshot.clone()
    }

    /// Returns a copy of one branch.
    pub fn branch(&self, repo: &str, branch: &str) -> Option<BranchState> {
        self.inner.state.lock().snapshot.branch(repo, branch).cloned()
    }

    /// Renders the status document as JSON.
    pub fn snapshot_json(&self) -> String {
        render(&self.inner.state.lock().snapshot)
    }

    /// Registers a live subscriber.
    ///
    /// The returned handle yields the current document immediately, then one
    /// full document per mutation. Dropping it unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.state.lock();

        let id = state.next_id;
        state.next_id += 1;

        // Cannot fail: the receiver is still in scope.
        let _ = tx.send(render(&state.snapshot));
        state.subscribers.push(Subscriber { id, tx });
        debug!(subscriber = id, total = state.subscribers.len(), "Subscriber added");

        Subscription {
            id,
            rx,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Drops status entries for repositories, branches and targets that are no
    /// longer configured.
    pub fn retain_configured(&self, repos: &[RepositoryConfig]) {
        self.mutate(|snapshot| {
            let before = count_entries(snapshot);

            snapshot.repos_mut().retain(|repo_name, repo_state| {
                let Some(repo) = repos.iter().find(|r| &r.name == repo_name) else {
                    return false;
                };
                repo_state.branches.retain(|branch_name, branch_state| {
                    let Some(branch) = repo.branch(branch_name) else {
                        return false;
                    };
                    branch_state
                        .targets
                        .retain(|target_name, _| branch.targets.iter().any(|t| &t.name == target_name));
                    true
                });
                true
            });

            let after = count_entries(snapshot);
            if after != before {
                info!(removed = before - after, "Evicted status for unconfigured entries");
            }
            after != before
        });
    }

    /// Runs `f` under the lock; if it reports a change, persists and fans out.
    fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut StatusSnapshot) -> bool,
    {
        let mut state = self.inner.state.lock();
        if !f(&mut state.snapshot) {
            return;
        }

        let json = render(&state.snapshot);

        if let Some(path) = &self.inner.path
            && let Err(e) = persist(path, &json)
        {
            warn!(error = %e, "Failed to persist status snapshot");
        }

        let before = state.subscribers.len();
        state.subscribers.retain(|sub| sub.tx.send(json.clone()).is_ok());
        let pruned = before - state.subscribers.len();
        if pruned > 0 {
            debug!(pruned, "Pruned closed subscribers");
        }
    }

    fn unsubscribe(inner: &Inner, id: u64) {
        let mut state = inner.state.lock();
        state.subscribers.retain(|sub| sub.id != id);
        debug!(subscriber = id, total = state.subscribers.len(), "Subscriber removed");
    }
}

/// A live feed of status documents.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<String>,
    store: Weak<Inner>,
}

impl Subscription {
    /// Waits for the next document. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Returns the next document if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            StateStore::unsubscribe(&inner, self.id);
        }
    }
}

fn render(snapshot: &StatusSnapshot) -> String {
    serde_json::to_string(snapshot).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize status snapshot");
        "{}".to_string()
    })
}

fn count_entries(snapshot: &StatusSnapshot) -> usize {
    snapshot
        .repos()
        .values()
        .map(|repo| {
            1 + repo
                .branches
                .values()
                .map(|branch| 1 + branch.targets.len())
                .sum::<usize>()
        })
        .sum()
}

/// Reads a snapshot file. `Ok(None)` if it does not exist.
pub(crate) fn load_snapshot(path: &Path) -> Result<Option<StatusSnapshot>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    Ok(Some(serde_json::from_str(&content)?))
}

/// Writes `json` next to `path` and renames it into place.
fn persist(path: &Path, json: &str) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    std::fs::write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BranchConfig, DeployTarget};
    use crate::status::SyncStatus;

    fn checking() -> BranchPatch {
        BranchPatch::new()
            .sync_status(SyncStatus::Checking)
            .last_check_time(Utc::now())
    }

    #[test]
    fn test_update_branch_creates_entry() {
        let store = StateStore::in_memory();
        store.update_branch("demo", "main", checking());

        let branch = store.branch("demo", "main").unwrap();
        assert_eq!(branch.sync_status, SyncStatus::Checking);
        assert_eq!(branch.commit_hash, "unknown");
        assert!(branch.last_check_time.is_some());
    }

    #[test]
    fn test_update_target_requires_branch() {
        let store = StateStore::in_memory();
        store.update_target("demo", "main", "web", TargetStatus::Deploying, "");
        assert!(store.snapshot().is_empty());

        store.update_branch("demo", "main", checking());
        store.update_target("demo", "main", "web", TargetStatus::Deploying, "");
        assert_eq!(
            store.snapshot().target("demo", "main", "web").unwrap().status,
            TargetStatus::Deploying
        );
    }

    #[test]
    fn test_success_sets_last_deploy_time() {
        let store = StateStore::in_memory();
        store.update_branch("demo", "main", checking());

        store.update_target("demo", "main", "web", TargetStatus::Deploying, "");
        let target = store.snapshot().target("demo", "main", "web").cloned().unwrap();
        assert!(target.last_deploy_time.is_none());

        store.update_target("demo", "main", "web", TargetStatus::Success, "Running");
        let target = store.snapshot().target("demo", "main", "web").cloned().unwrap();
        assert!(target.last_deploy_time.is_some());
        assert_eq!(target.message, "Running");

        // An error afterwards keeps the last successful deploy time.
        store.update_target("demo", "main", "web", TargetStatus::Error, "boom");
        let target = store.snapshot().target("demo", "main", "web").cloned().unwrap();
        assert!(target.last_deploy_time.is_some());
    }

    #[tokio::test]
    async fn test_subscriber_receives_initial_and_updates() {
        let store = StateStore::in_memory();
        store.update_branch("demo", "main", checking());

        let mut sub = store.subscribe();
        let initial: serde_json::Value = serde_json::from_str(&sub.recv().await.unwrap()).unwrap();
        assert_eq!(initial["demo"]["branches"]["main"]["sync_status"], "checking");

        store.update_target("demo", "main", "web", TargetStatus::Success, "Running");
        let next: serde_json::Value = serde_json::from_str(&sub.recv().await.unwrap()).unwrap();
        let web = &next["demo"]["branches"]["main"]["targets"]["web"];
        assert_eq!(web["status"], "success");
        assert!(!web["last_deploy_time"].is_null());
    }

    #[tokio::test]
    async fn test_subscriber_sees_every_repo() {
        let store = StateStore::in_memory();
        let mut sub = store.subscribe();
        sub.recv().await.unwrap();

        store.update_branch("other", "dev", checking());
        let next = sub.recv().await.unwrap();
        assert!(next.contains("\"other\""));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let store = StateStore::in_memory();
        let first = store.subscribe();
        let second = store.subscribe();
        assert_eq!(store.subscriber_count(), 2);

        drop(first);
        assert_eq!(store.subscriber_count(), 1);

        drop(second);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_noop_update_is_not_fanned_out() {
        let store = StateStore::in_memory();
        let mut sub = store.subscribe();
        assert!(sub.try_recv().is_some());

        store.update_target("missing", "main", "web", TargetStatus::Error, "");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("vigilcd_status.json");

        let store = StateStore::open(&path);
        store.update_branch("demo", "main", checking().commit_hash("abc1234"));
        store.update_target("demo", "main", "web", TargetStatus::Success, "Running");
        assert!(path.exists());

        let reloaded = StateStore::open(&path);
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigilcd_status.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = StateStore::open(&path);
        assert!(store.snapshot().is_empty());
        assert!(matches!(load_snapshot(&path), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_retain_configured() {
        let store = StateStore::in_memory();
        store.update_branch("demo", "main", checking());
        store.update_branch("demo", "old", checking());
        store.update_branch("gone", "main", checking());
        store.update_target("demo", "main", "web", TargetStatus::Success, "Running");
        store.update_target("demo", "main", "worker", TargetStatus::Success, "Running");

        let repos = vec![RepositoryConfig {
            name: "demo".to_string(),
            url: "https://github.com/org/demo.git".to_string(),
            auth_method: Default::default(),
            ssh_key_path: None,
            registries: vec![],
            branches: vec![BranchConfig {
                name: "main".to_string(),
                sync_enabled: true,
                targets: vec![DeployTarget {
                    name: "web".to_string(),
                    file: "docker-compose.yml".to_string(),
                    deploy: true,
                    build_images: false,
                }],
            }],
        }];

        store.retain_configured(&repos);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.repos().len(), 1);
        assert!(snapshot.branch("demo", "old").is_none());
        assert!(snapshot.target("demo", "main", "web").is_some());
        assert!(snapshot.target("demo", "main", "worker").is_none());
    }

    #[test]
    fn test_concurrent_updates_are_not_torn() {
        let store = StateStore::in_memory();
        let threads: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let status = if i % 2 == 0 {
                        SyncStatus::Pulling
                    } else {
                        SyncStatus::Error
                    };
                    store.update_branch(
                        "demo",
                        "main",
                        BranchPatch::new()
                            .sync_status(status)
                            .commit_hash(format!("{:07}", i)),
                    );
                })
            })
            .collect();

        for handle in threads {
            handle.join().unwrap();
        }

        let branch = store.branch("demo", "main").unwrap();
        let winner: u32 = branch.commit_hash.parse().unwrap();
        let expected = if winner % 2 == 0 {
            SyncStatus::Pulling
        } else {
            SyncStatus::Error
        };
        assert_eq!(branch.sync_status, expected);
    }
}
