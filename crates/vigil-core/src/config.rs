//! Repository, branch and target configuration.
//!
//! These types are loaded once at startup and are read-only afterwards.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::credentials::parse_scp_like;
use crate::error::ConfigurationError;

/// How the agent authenticates against a repository remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// HTTPS, optionally with a host-scoped token.
    #[default]
    Https,
    /// SSH with a private key.
    Ssh,
}

/// A docker registry the repository's images are pulled from.
///
/// A registry without a username is public and never logged into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentialConfig {
    /// Registry address, e.g. `ghcr.io` or `registry.company.com:5000`.
    pub url: String,

    /// Login user. `None` marks the registry as public.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Name of the secret holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,
}

impl RegistryCredentialConfig {
    /// Returns true if no login is needed for this registry.
    pub fn is_public(&self) -> bool {
        self.username.is_none()
    }
}

/// One docker-compose stack inside a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTarget {
    /// Target name, unique within its branch.
    pub name: String,

    /// Compose file path, relative to the working copy.
    pub file: String,

    /// Whether the target is deployed at all.
    #[serde(default)]
    pub deploy: bool,

    /// Whether `compose up` runs with `--build`.
    #[serde(default)]
    pub build_images: bool,
}

/// A branch that is kept in sync with its compose targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Branch name on the remote.
    pub name: String,

    /// Branches with sync disabled get no scheduling lane.
    #[serde(default = "default_true")]
    pub sync_enabled: bool,

    /// Compose targets deployed from this branch.
    #[serde(default)]
    pub targets: Vec<DeployTarget>,
}

/// A repository and the branches deployed from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository name, used for state keys and working copy paths.
    pub name: String,

    /// Remote URL (HTTPS or SSH syntax).
    pub url: String,

    /// Authentication method.
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// Per-repository SSH key, overriding the global one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<PathBuf>,

    /// Registries to log into before deploying.
    #[serde(default)]
    pub registries: Vec<RegistryCredentialConfig>,

    /// Branches deployed from this repository.
    #[serde(default)]
    pub branches: Vec<BranchConfig>,
}

fn default_true() -> bool {
    true
}

impl RepositoryConfig {
    /// Looks up a branch by name.
    pub fn branch(&self, name: &str) -> Option<&BranchConfig> {
        self.branches.iter().find(|b| b.name == name)
    }

    /// Returns the registries that require a login.
    pub fn private_registries(&self) -> impl Iterator<Item = &RegistryCredentialConfig> {
        self.registries.iter().filter(|r| !r.is_public())
    }

    /// Validates the repository schema.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidRepository` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::invalid_repository(&self.name, reason);

        if self.name.trim().is_empty() {
            return Err(invalid("name cannot be empty".to_string()));
        }
        if self.name.contains('/') || self.name.contains("..") {
            return Err(invalid("name cannot contain '/' or '..'".to_string()));
        }
        if self.url.trim().is_empty() {
            return Err(invalid("url cannot be empty".to_string()));
        }

        if self.auth_method == AuthMethod::Ssh && !is_ssh_url(&self.url) {
            return Err(invalid(format!(
                "auth_method 'ssh' requires an SSH url (user@host:path), got '{}'",
                self.url
            )));
        }

        for registry in &self.registries {
            if registry.username.is_some() && registry.password_env_var.is_none() {
                return Err(invalid(format!(
                    "registry '{}' has a username but no password_env_var",
                    registry.url
                )));
            }
        }

        let mut branch_names = HashSet::new();
        for branch in &self.branches {
            if branch.name.trim().is_empty() {
                return Err(invalid("branch name cannot be empty".to_string()));
            }
            if !branch_names.insert(branch.name.as_str()) {
                return Err(invalid(format!("duplicate branch '{}'", branch.name)));
            }

            let mut target_names = HashSet::new();
            for target in &branch.targets {
                if target.name.trim().is_empty() {
                    return Err(invalid(format!(
                        "branch '{}' has a target without a name",
                        branch.name
                    )));
                }
                if !target_names.insert(target.name.as_str()) {
                    return Err(invalid(format!(
                        "duplicate target '{}' in branch '{}'",
                        target.name, branch.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Returns true for `user@host:path` and `ssh://` URLs.
pub fn is_ssh_url(url: &str) -> bool {
    url.starts_with("ssh://") || parse_scp_like(url).is_some()
}
