//! Per-branch reconciliation lanes.
//!
//! Every sync-enabled (repository, branch) pair gets its own lane: a task
//! that runs a pass on each interval tick or webhook trigger. A lane never
//! overlaps with itself and lanes never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};
use vigil_core::Settings;

/// Runs one reconciliation pass.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Reconciles `repo`/`branch`. Failures are recorded, never returned.
    async fn reconcile(&self, repo: &str, branch: &str);
}

/// Result of [`SchedulerHandle::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A pass was queued.
    Triggered,
    /// A pass was already queued; the trigger was merged into it.
    AlreadyQueued,
    /// No lane exists for the pair.
    Unknown,
}

type LaneKey = (String, String);

/// Configured lanes, not yet running.
#[derive(Debug, Clone)]
pub struct Scheduler {
    period: Duration,
    lanes: Vec<LaneKey>,
}

impl Scheduler {
    /// Creates a scheduler for `lanes`, each running every `period`.
    pub fn new(period: Duration, lanes: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            period,
            lanes: lanes.into_iter().collect(),
        }
    }

    /// One lane per sync-enabled branch in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let lanes = settings.repos.iter().flat_map(|repo| {
            repo.branches
                .iter()
                .filter(|branch| branch.sync_enabled)
                .map(|branch| (repo.name.clone(), branch.name.clone()))
        });
        Self::new(settings.check_interval(), lanes)
    }

    /// Spawns every lane. Each lane runs its first pass immediately.
    pub fn start<R: Reconciler>(self, reconciler: Arc<R>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut triggers = HashMap::new();
        let mut tasks = Vec::new();

        for key in self.lanes {
            let (trigger_tx, trigger_rx) = mpsc::channel(1);
            let lane = Lane {
                repo: key.0.clone(),
                branch: key.1.clone(),
                period: self.period,
                triggers: trigger_rx,
                shutdown: shutdown_rx.clone(),
            };
            tasks.push(tokio::spawn(lane.run(reconciler.clone())));
            triggers.insert(key, trigger_tx);
        }

        info!(
            lanes = triggers.len(),
            interval_secs = self.period.as_secs(),
            "Scheduler started"
        );

        SchedulerHandle {
            inner: Arc::new(HandleInner {
                triggers,
                shutdown: shutdown_tx,
                tasks: Mutex::new(tasks),
            }),
        }
    }
}

struct Lane {
    repo: String,
    branch: String,
    period: Duration,
    triggers: mpsc::Receiver<()>,
    shutdown: watch::Receiver<bool>,
}

impl Lane {
    async fn run<R: Reconciler>(mut self, reconciler: Arc<R>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {
                    debug!(repo = %self.repo, branch = %self.branch, "Scheduled pass");
                }
                Some(()) = self.triggers.recv() => {
                    debug!(repo = %self.repo, branch = %self.branch, "Triggered pass");
                }
            }

            reconciler.reconcile(&self.repo, &self.branch).await;
        }

        debug!(repo = %self.repo, branch = %self.branch, "Lane stopped");
    }
}

struct HandleInner {
    triggers: HashMap<LaneKey, mpsc::Sender<()>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Controls running lanes.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<HandleInner>,
}

impl SchedulerHandle {
    /// Queues a pass for `repo`/`branch`.
    pub fn trigger(&self, repo: &str, branch: &str) -> TriggerOutcome {
        let key = (repo.to_string(), branch.to_string());
        let Some(sender) = self.inner.triggers.get(&key) else {
            return TriggerOutcome::Unknown;
        };

        match sender.try_send(()) {
            Ok(()) => TriggerOutcome::Triggered,
            Err(mpsc::error::TrySendError::Full(())) => TriggerOutcome::AlreadyQueued,
            Err(mpsc::error::TrySendError::Closed(())) => TriggerOutcome::Unknown,
        }
    }

    /// Returns true if a lane exists for `repo`/`branch`.
    pub fn has_lane(&self, repo: &str, branch: &str) -> bool {
        self.inner
            .triggers
            .contains_key(&(repo.to_string(), branch.to_string()))
    }

    /// Number of lanes.
    pub fn lane_count(&self) -> usize {
        self.inner.triggers.len()
    }

    /// Stops every lane and waits for in-flight passes to finish.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);

        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        info!("Scheduler stopped");
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("lanes", &self.inner.triggers.len())
            .finish()
    }
}
