//! Secret lookup.
//!
//! The agent only ever asks for secrets by key (SSH key path, git tokens,
//! webhook secret, registry passwords). Where they are stored is decided once
//! at startup by [`SecretBackend`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A source of secrets.
pub trait SecretProvider: Send + Sync {
    /// Returns the secret stored under `key`, if any.
    fn get_secret(&self, key: &str) -> Option<String>;
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Process environment.
    #[default]
    Env,
    /// A `KEY=VALUE` file read once at startup.
    File,
    /// Docker secrets mounted under `/run/secrets`.
    Docker,
}

impl SecretBackend {
    /// Builds the provider for this backend.
    ///
    /// `secrets_file` is only used by [`SecretBackend::File`].
    pub fn build(self, secrets_file: &Path) -> Arc<dyn SecretProvider> {
        info!(backend = ?self, "Secret backend initialized");
        match self {
            Self::Env => Arc::new(EnvSecrets),
            Self::File => Arc::new(FileSecrets::load(secrets_file)),
            Self::Docker => Arc::new(DirectorySecrets::new("/run/secrets")),
        }
    }
}

/// Reads secrets from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretProvider for EnvSecrets {
    fn get_secret(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Secrets parsed from a `KEY=VALUE` file.
#[derive(Debug, Clone, Default)]
pub struct FileSecrets {
    values: HashMap<String, String>,
}

impl FileSecrets {
    /// Loads the file. A missing or unreadable file yields an empty provider.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let values = parse_env_lines(&content);
                info!(count = values.len(), path = %path.display(), "Loaded secrets file");
                Self { values }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Secrets file not readable");
                Self::default()
            },
        }
    }
}

impl SecretProvider for FileSecrets {
    fn get_secret(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// One file per secret in a directory, as docker secrets are mounted.
#[derive(Debug, Clone)]
pub struct DirectorySecrets {
    root: PathBuf,
}

impl DirectorySecrets {
    /// Creates a provider reading from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SecretProvider for DirectorySecrets {
    fn get_secret(&self, key: &str) -> Option<String> {
        if key.is_empty() || key.contains('/') || key.contains("..") {
            return None;
        }

        let path = self.root.join(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Some(value.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read secret");
                None
            },
        }
    }
}

/// In-memory secrets.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    /// Adds or replaces a secret.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticSecrets {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SecretProvider for StaticSecrets {
    fn get_secret(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Parses `KEY=VALUE` lines.
///
/// Blank lines and `#` comments are skipped, the value is split on the first `=`,
/// and lines without `=` are ignored.
pub fn parse_env_lines(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_lines() {
        let values = parse_env_lines(
            "# comment\n\nDATABASE_URL=postgres://u:p@db/app?sslmode=require\nEMPTY=\nNO_EQUALS\n  SPACED = value \n",
        );

        assert_eq!(
            values.get("DATABASE_URL").map(String::as_str),
            Some("postgres://u:p@db/app?sslmode=require")
        );
        assert_eq!(values.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(values.get("SPACED").map(String::as_str), Some("value"));
        assert!(!values.contains_key("NO_EQUALS"));
        assert!(!values.contains_key("# comment"));
    }

    #[test]
    fn test_file_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.secrets");
        std::fs::write(&path, "GITHUB_TOKEN=abc\n").unwrap();

        let secrets = FileSecrets::load(&path);
        assert_eq!(secrets.get_secret("GITHUB_TOKEN").as_deref(), Some("abc"));
        assert_eq!(secrets.get_secret("OTHER"), None);

        let missing = FileSecrets::load(&dir.path().join("missing"));
        assert_eq!(missing.get_secret("GITHUB_TOKEN"), None);
    }

    #[test]
    fn test_directory_secrets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("REGISTRY_PASSWORD"), "hunter2\n").unwrap();

        let secrets = DirectorySecrets::new(dir.path());
        assert_eq!(
            secrets.get_secret("REGISTRY_PASSWORD").as_deref(),
            Some("hunter2")
        );
        assert_eq!(secrets.get_secret("MISSING"), None);
        assert_eq!(secrets.get_secret("../etc/passwd"), None);
    }
}
