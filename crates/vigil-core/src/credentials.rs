//! Host-scoped git credential resolution.
//!
//! Credentials are only handed out for hosts on an explicit allow-list. The host
//! is extracted by parsing the remote URL, never by substring search, so
//! `https://github.com.evil.example/...` does not receive a `github.com` token.

use std::collections::HashMap;
use std::sync::Arc;

use crate::secrets::SecretProvider;

/// A credential resolved for a specific git host.
#[derive(Clone, PartialEq, Eq)]
pub enum GitCredential {
    /// An HTTPS access token.
    Token {
        /// Lower-cased host the token belongs to.
        host: String,
        /// The token value.
        token: String,
    },
}

impl std::fmt::Debug for GitCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { host, .. } => f
                .debug_struct("Token")
                .field("host", host)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Resolves per-host tokens for HTTPS remotes.
#[derive(Clone)]
pub struct HostCredentialResolver {
    /// Lower-cased host → secret key holding its token.
    allowed: HashMap<String, String>,
    secrets: Arc<dyn SecretProvider>,
}

impl HostCredentialResolver {
    /// Creates a resolver for the given `host → secret key` allow-list.
    pub fn new(
        allowed: impl IntoIterator<Item = (String, String)>,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            allowed: allowed
                .into_iter()
                .map(|(host, key)| (host.to_ascii_lowercase(), key))
                .collect(),
            secrets,
        }
    }

    /// Returns the token for `remote_url`'s host, if that host is allowed and a
    /// token is stored for it.
    pub fn resolve(&self, remote_url: &str) -> Option<GitCredential> {
        let host = remote_host(remote_url)?;
        let key = self.allowed.get(&host)?;
        let token = self.secrets.get_secret(key)?;

        if token.is_empty() {
            return None;
        }

        Some(GitCredential::Token { host, token })
    }
}

impl std::fmt::Debug for HostCredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCredentialResolver")
            .field("allowed_hosts", &self.allowed.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Extracts the lower-cased host of a git remote URL.
///
/// Supports URL syntax (`https://`, `http://`, `ssh://`, `git://`) and the
/// scp-like `user@host:path` form.
pub fn remote_host(remote_url: &str) -> Option<String> {
    let remote_url = remote_url.trim();

    if remote_url.contains("://") {
        let parsed = url::Url::parse(remote_url).ok()?;
        return parsed.host_str().map(|h| h.to_ascii_lowercase());
    }

    parse_scp_like(remote_url).map(|(_, host, _)| host.to_ascii_lowercase())
}

/// Splits an scp-like `user@host:path` remote into its parts.
pub(crate) fn parse_scp_like(remote_url: &str) -> Option<(&str, &str, &str)> {
    if remote_url.contains("://") {
        return None;
    }

    let (user, rest) = remote_url.split_once('@')?;
    let (host, path) = rest.split_once(':')?;

    let valid_host = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if user.is_empty() || user.contains('/') || !valid_host || path.is_empty() {
        return None;
    }

    Some((user, host, path))
}
