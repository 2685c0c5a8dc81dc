//! # VigilCD Deploy
//!
//! Deploys docker compose targets and detects drift.
//!
//! - [`DockerEndpoint`] resolves where docker commands are sent, once at startup
//! - [`EnvironmentValidator`] checks a compose file's variables and `env_file`s
//! - [`DockerCli`] wraps `docker info`, registry login/logout and `compose`
//! - [`HealthChecker`] reports whether a target's project is still running
//! - [`DeploymentExecutor`] runs a full deployment and records it in the
//!   [`StateStore`](vigil_core::StateStore)
//!
//! Every target gets its own compose project, named by [`project_name`].

pub mod docker;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod health;
pub mod project;
pub mod validator;

pub use docker::{DockerCli, DockerTimeouts, RegistryLogin};
pub use endpoint::{DockerEndpoint, EndpointEnv, EndpointSource, Platform};
pub use error::DeploymentError;
pub use executor::{DeployOutcome, DeploymentExecutor};
pub use health::{ActualState, HealthChecker};
pub use project::project_name;
pub use validator::{EnvironmentValidator, ValidationReport};
