//! Git authentication environment.
//!
//! Credentials reach git only through environment variables on the
//! subprocess: a host-scoped `http.extraHeader` for HTTPS tokens, or
//! `GIT_SSH_COMMAND` for key-based SSH. Nothing is written to `.git/config`
//! and nothing secret appears in the argument list.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;
use vigil_core::{AuthMethod, CommandSpec, GitCredential, HostCredentialResolver, RepositoryConfig, SecretProvider};

use crate::error::GitOperationError;

/// How git subprocesses for one repository authenticate.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum GitAuth {
    /// No credentials; public remotes.
    #[default]
    Anonymous,
    /// Basic-auth header sent only to `origin`.
    Header {
        /// `scheme://host[:port]` the header is scoped to.
        origin: String,
        /// Full header line.
        header: String,
    },
    /// SSH with a private key.
    Ssh {
        /// Private key file.
        key_path: PathBuf,
    },
}

impl GitAuth {
    /// Resolves the authentication for `repo`.
    ///
    /// HTTPS repositories get a token only if their host is on the resolver's
    /// allow-list. SSH repositories use their own `ssh_key_path`, or the path
    /// stored under `ssh_key_secret`.
    ///
    /// # Errors
    ///
    /// Returns `GitOperationError::SshKeyMissing` if an SSH repository has no
    /// key configured or the key file does not exist.
    pub fn resolve(
        repo: &RepositoryConfig,
        credentials: &HostCredentialResolver,
        secrets: &dyn SecretProvider,
        ssh_key_secret: &str,
    ) -> Result<Self, GitOperationError> {
        match repo.auth_method {
            AuthMethod::Https => Ok(match credentials.resolve(&repo.url) {
                Some(credential) => {
                    debug!(repo = %repo.name, "Using host-scoped token for HTTPS remote");
                    Self::from_credential(&repo.url, &credential)
                },
                None => Self::Anonymous,
            }),
            AuthMethod::Ssh => {
                let key_path = match &repo.ssh_key_path {
                    Some(path) => path.clone(),
                    None => secrets
                        .get_secret(ssh_key_secret)
                        .filter(|p| !p.trim().is_empty())
                        .map(PathBuf::from)
                        .ok_or_else(|| {
                            GitOperationError::ssh_key_missing(format!(
                                "no ssh_key_path for '{}' and {} is not set",
                                repo.name, ssh_key_secret
                            ))
                        })?,
                };

                if !key_path.is_file() {
                    return Err(GitOperationError::ssh_key_missing(format!(
                        "{} does not exist",
                        key_path.display()
                    )));
                }

                Ok(Self::Ssh { key_path })
            },
        }
    }

    fn from_credential(remote_url: &str, credential: &GitCredential) -> Self {
        let GitCredential::Token { token, .. } = credential;

        let Some(origin) = url_origin(remote_url) else {
            return Self::Anonymous;
        };

        let encoded = STANDARD.encode(format!("x-access-token:{}", token));
        Self::Header {
            origin,
            header: format!("Authorization: Basic {}", encoded),
        }
    }

    /// Adds the authentication variables to `spec`.
    pub fn apply(&self, spec: CommandSpec) -> CommandSpec {
        let spec = spec.env("GIT_TERMINAL_PROMPT", "0");
        match self {
            Self::Anonymous => spec,
            Self::Header { origin, header } => spec
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", format!("http.{}/.extraheader", origin))
                .env("GIT_CONFIG_VALUE_0", header.clone()),
            Self::Ssh { key_path } => spec.env("GIT_SSH_COMMAND", ssh_command(key_path)),
        }
    }
}

impl std::fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Header { origin, .. } => f
                .debug_struct("Header")
                .field("origin", origin)
                .field("header", &"<redacted>")
                .finish(),
            Self::Ssh { key_path } => f.debug_struct("Ssh").field("key_path", key_path).finish(),
        }
    }
}

/// `scheme://host[:port]` of an HTTP(S) URL.
fn url_origin(remote_url: &str) -> Option<String> {
    let parsed = url::Url::parse(remote_url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

fn ssh_command(key_path: &Path) -> String {
    format!(
        "ssh -i {} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -o IdentitiesOnly=yes",
        shell_quote(&key_path.to_string_lossy())
    )
}

/// Single-quotes `value` for the shell git runs `GIT_SSH_COMMAND` through.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
