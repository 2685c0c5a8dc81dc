//! Agent settings.
//!
//! Settings are layered with the `config` crate: built-in defaults, then the
//! YAML file, then a fixed set of `VIGILCD_*` environment overrides. The result
//! is validated once; any problem is a [`ConfigurationError`] and the agent does
//! not start.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::config::RepositoryConfig;
use crate::error::ConfigurationError;
use crate::retry::RetryPolicy;
use crate::secrets::SecretBackend;

/// Default location of the settings file.
pub const DEFAULT_CONFIG_PATH: &str = "/home/vigilcd/src/config/config.yaml";

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Environment variables that override individual settings.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("VIGILCD_CHECK_INTERVAL_MINUTES", "scheduling.check_interval_minutes"),
    ("VIGILCD_GIT_RETRY_COUNT", "scheduling.git_retry_count"),
    ("VIGILCD_RETRY_BACKOFF_FACTOR", "scheduling.retry_backoff_factor"),
    ("VIGILCD_DOCKER_TIMEOUT", "deployment.docker_compose_timeout_seconds"),
    ("VIGILCD_GIT_TIMEOUT", "deployment.git_operation_timeout_seconds"),
    ("VIGILCD_DOCKER_DAEMON_TIMEOUT", "deployment.docker_daemon_timeout_seconds"),
    ("VIGILCD_LOG_LEVEL", "logging.level"),
    ("VIGILCD_LOG_FORMAT", "logging.format"),
    ("VIGILCD_HOST", "server.host"),
    ("VIGILCD_PORT", "server.port"),
    ("REPO_BASE_PATH", "paths.repo_base_path"),
    ("VIGILCD_STATUS_FILE", "paths.status_file"),
    ("VIGILCD_SECRET_BACKEND", "secrets.backend"),
];

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Check interval and retry policy.
    pub scheduling: SchedulingSettings,
    /// Subprocess timeouts.
    pub deployment: DeploymentSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
    /// HTTP listener.
    pub server: ServerSettings,
    /// Working copy and status file locations.
    pub paths: PathSettings,
    /// Secret backend and credential allow-list.
    pub secrets: SecretSettings,
    /// Repositories to reconcile.
    pub repos: Vec<RepositoryConfig>,
}

/// Scheduling and retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingSettings {
    /// Minutes between periodic passes of each lane.
    pub check_interval_minutes: u64,
    /// Attempts for each remote git operation.
    pub git_retry_count: u32,
    /// Backoff base in seconds.
    pub retry_backoff_factor: f64,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            check_interval_minutes: 1,
            git_retry_count: 3,
            retry_backoff_factor: 2.0,
        }
    }
}

/// Subprocess timeouts in seconds. `0` waits indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSettings {
    /// `docker compose up` timeout.
    pub docker_compose_timeout_seconds: u64,
    /// Timeout of each git subprocess.
    pub git_operation_timeout_seconds: u64,
    /// `docker info` probe timeout.
    pub docker_daemon_timeout_seconds: u64,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            docker_compose_timeout_seconds: 300,
            git_operation_timeout_seconds: 60,
            docker_daemon_timeout_seconds: 10,
        }
    }
}

impl DeploymentSettings {
    /// Timeout for `docker compose` invocations.
    pub fn compose_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.docker_compose_timeout_seconds)
    }

    /// Timeout for git subprocesses.
    pub fn git_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.git_operation_timeout_seconds)
    }

    /// Timeout for the docker daemon probe.
    pub fn daemon_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.docker_daemon_timeout_seconds)
    }
}

/// Converts a seconds setting to a timeout; `0` disables it.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:4200".to_string()],
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Root of the working copies: `<repo_base_path>/<repo>/<branch>`.
    pub repo_base_path: PathBuf,
    /// Status snapshot file.
    pub status_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            repo_base_path: PathBuf::from("/home/vigilcd/src/repos"),
            status_file: PathBuf::from("vigilcd_status.json"),
        }
    }
}

/// Secret lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretSettings {
    /// Where secrets are read from.
    pub backend: SecretBackend,
    /// Secrets file for the `file` backend.
    pub file: PathBuf,
    /// Hosts allowed to receive an HTTPS token.
    pub allowed_git_hosts: Vec<GitHostCredential>,
    /// Secret key holding the default SSH private key path.
    pub ssh_key_path_key: String,
    /// Secret key holding the GitHub webhook secret.
    pub webhook_secret_key: String,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            backend: SecretBackend::Env,
            file: PathBuf::from(".env.secrets"),
            allowed_git_hosts: vec![GitHostCredential {
                host: "github.com".to_string(),
                token_key: "GITHUB_TOKEN".to_string(),
            }],
            ssh_key_path_key: "VIGILCD_SSH_KEY_PATH".to_string(),
            webhook_secret_key: "GITHUB_WEBHOOK_SECRET".to_string(),
        }
    }
}

/// A git host and the secret key of its token.
///
/// A list, not a map: dotted host names would be split into nested config keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHostCredential {
    /// Exact host name, compared case-insensitively.
    pub host: String,
    /// Secret key holding the token.
    pub token_key: String,
}

impl SecretSettings {
    /// Returns `(host, secret key)` pairs for [`crate::HostCredentialResolver`].
    pub fn git_host_keys(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.allowed_git_hosts
            .iter()
            .map(|entry| (entry.host.clone(), entry.token_key.clone()))
    }
}

impl Settings {
    /// Loads settings from `path` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the file cannot be parsed or validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Loads settings with environment overrides taken from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the file cannot be parsed or validation fails.
    pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml));

        for (var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, lookup(var))?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from a YAML string without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the document cannot be parsed or validation fails.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks ranges and repository consistency.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.scheduling.check_interval_minutes < 1 {
            return Err(ConfigurationError::invalid_setting(
                "scheduling.check_interval_minutes",
                "must be at least 1",
            ));
        }
        if self.scheduling.git_retry_count < 1 {
            return Err(ConfigurationError::invalid_setting(
                "scheduling.git_retry_count",
                "must be at least 1",
            ));
        }
        let factor = self.scheduling.retry_backoff_factor;
        if factor.is_nan() || factor < 1.0 {
            return Err(ConfigurationError::invalid_setting(
                "scheduling.retry_backoff_factor",
                "must be at least 1.0",
            ));
        }

        let compose = self.deployment.docker_compose_timeout_seconds;
        if compose != 0 && compose < 10 {
            return Err(ConfigurationError::invalid_setting(
                "deployment.docker_compose_timeout_seconds",
                "must be 0 (no timeout) or at least 10",
            ));
        }

        let mut names = HashSet::new();
        for repo in &self.repos {
            repo.validate()?;
            if !names.insert(repo.name.as_str()) {
                return Err(ConfigurationError::invalid_repository(
                    &repo.name,
                    "duplicate repository name",
                ));
            }
        }

        Ok(())
    }

    /// Retry policy for remote git operations.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.scheduling.git_retry_count,
            self.scheduling.retry_backoff_factor,
        )
    }

    /// Interval between periodic passes.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.scheduling.check_interval_minutes.saturating_mul(60))
    }

    /// Looks up a configured repository.
    pub fn repo(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repos.iter().find(|r| r.name == name)
    }

    /// Working copy of `repo`/`branch`.
    pub fn working_dir(&self, repo: &str, branch: &str) -> PathBuf {
        self.paths.repo_base_path.join(repo).join(branch)
    }
}

/// Returns the settings path from `CONFIG_PATH`, or the default.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
