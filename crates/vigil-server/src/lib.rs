//! VigilCD Server - the reconciliation agent.
//!
//! Wires the git and deploy crates into a per-branch reconciliation engine,
//! runs it on independent lanes, and exposes status, configuration, webhooks
//! and metrics over HTTP.

pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod state;
pub mod sync;

pub use error::AppError;
pub use handlers::health::HealthResponse;
pub use server::{create_router, run_server, shutdown_signal};
pub use state::AppState;
pub use sync::{PassOutcome, Reconciler, RepoSyncEngine, Scheduler, SchedulerHandle, TriggerOutcome};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
