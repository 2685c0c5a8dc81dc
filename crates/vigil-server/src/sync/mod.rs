//! Reconciliation engine and scheduling.

pub mod engine;
pub mod scheduler;

pub use engine::{PassOutcome, RepoSyncEngine};
pub use scheduler::{Reconciler, Scheduler, SchedulerHandle, TriggerOutcome};
