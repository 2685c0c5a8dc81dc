//! # VigilCD Git
//!
//! Working copy management for the reconciliation agent.
//!
//! ## Features
//!
//! - Git operations via the system `git` CLI, through vigil-core's `CommandRunner`
//! - Clone with cleanup of partial checkouts, `ls-remote` tip lookup, hard reset
//! - Retries with exponential backoff for remote-facing operations
//! - HTTPS tokens and SSH keys passed through the subprocess environment only
//!
//! ## Example
//!
//! ```ignore
//! use vigil_git::{GitAuth, GitClient, WorkingCopy};
//!
//! let wc = WorkingCopy::new("/srv/repos/demo/main", "https://github.com/org/demo.git", "main", GitAuth::Anonymous)?;
//! let client = GitClient::new(runner, retry, Some(Duration::from_secs(60)));
//!
//! let cloned = client.ensure_cloned(&wc).await?;
//! if cloned || client.remote_head(&wc).await? != client.local_head(&wc).await? {
//!     client.pull(&wc).await?;
//! }
//! ```

pub mod auth;
pub mod error;
pub mod refs;
pub mod workspace;

// Re-exports
pub use auth::GitAuth;
pub use error::GitOperationError;
pub use refs::{BranchRef, short_hash};
pub use workspace::{GitClient, WorkingCopy};
