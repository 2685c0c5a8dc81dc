//! # VigilCD Core
//!
//! Domain types and shared primitives for the VigilCD reconciliation agent.
//!
//! This crate owns everything the git, deploy and server crates agree on:
//!
//! - The read-only configuration model ([`RepositoryConfig`], [`BranchConfig`],
//!   [`DeployTarget`], [`RegistryCredentialConfig`]) and its loader ([`Settings`])
//! - The status model ([`BranchState`], [`TargetState`]) and the [`StateStore`]
//!   that owns it, persists it and fans snapshots out to subscribers
//! - [`RetryExecutor`], the exponential backoff wrapper for recoverable operations
//! - [`CommandRunner`], the seam through which every `git`/`docker` subprocess runs
//! - Secret lookup and host-scoped credential resolution
//!
//! ## Example
//!
//! ```ignore
//! use vigil_core::{BranchPatch, StateStore, SyncStatus, TargetStatus};
//!
//! let store = StateStore::open("vigilcd_status.json");
//! store.update_branch("demo", "main", BranchPatch::new().sync_status(SyncStatus::Checking));
//! store.update_target("demo", "main", "web", TargetStatus::Success, "Running");
//!
//! let mut sub = store.subscribe();
//! let initial = sub.recv().await;
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod process;
pub mod retry;
pub mod secrets;
pub mod settings;
pub mod status;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use config::{AuthMethod, BranchConfig, DeployTarget, RegistryCredentialConfig, RepositoryConfig};
pub use credentials::{GitCredential, HostCredentialResolver};
pub use error::{ConfigurationError, StoreError};
pub use process::{CommandError, CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use retry::{Recoverable, RetryExecutor, RetryPolicy};
pub use secrets::{SecretBackend, SecretProvider};
pub use settings::Settings;
pub use status::{BranchPatch, BranchState, RepoState, StatusSnapshot, SyncStatus, TargetState, TargetStatus};
pub use store::{StateStore, Subscription};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
