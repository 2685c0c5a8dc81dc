//! Docker endpoint resolution.
//!
//! The endpoint is resolved once at startup and applied to every docker
//! subprocess. An explicit `DOCKER_HOST` always wins. Otherwise the platform
//! default is used: the Unix socket on Unix-like hosts (and WSL), the named
//! pipe on Windows, or loopback TCP on Windows when explicitly requested.

use std::fmt;

use tracing::info;
use vigil_core::CommandSpec;

/// Variable docker reads its endpoint from.
pub const DOCKER_HOST_VAR: &str = "DOCKER_HOST";

/// Forces the Unix socket even when built for Windows.
pub const LOCAL_WSL_VAR: &str = "VIGILCD_LOCAL_WSL";

/// Requests the loopback TCP endpoint on Windows.
pub const LOCAL_WINDOWS_TCP_VAR: &str = "VIGILCD_LOCAL_WINDOWS_TCP";

const UNIX_SOCKET: &str = "unix:///var/run/docker.sock";
const NAMED_PIPE: &str = "npipe://./pipe/docker_engine";
const WINDOWS_TCP: &str = "tcp://127.0.0.1:2375";

/// Where the resolved endpoint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    /// `DOCKER_HOST` was set.
    Override,
    /// A non-default local endpoint was asked for.
    Requested,
    /// The platform default.
    Detected,
}

/// The platform the agent runs on, as far as docker is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux, macOS and WSL.
    Unix,
    /// Native Windows.
    Windows,
}

/// Inputs to endpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointEnv {
    /// Value of `DOCKER_HOST`, if set and non-empty.
    pub docker_host: Option<String>,
    /// Host platform.
    pub platform: Platform,
    /// Whether loopback TCP was requested on Windows.
    pub windows_tcp: bool,
}

impl EndpointEnv {
    /// Reads the inputs from the process environment.
    pub fn from_process() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the inputs through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).is_some_and(|v| is_truthy(&v));

        let platform = if cfg!(windows) && !flag(LOCAL_WSL_VAR) {
            Platform::Windows
        } else {
            Platform::Unix
        };

        Self {
            docker_host: lookup(DOCKER_HOST_VAR).filter(|v| !v.trim().is_empty()),
            platform,
            windows_tcp: flag(LOCAL_WINDOWS_TCP_VAR),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// The resolved docker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerEndpoint {
    host: String,
    source: EndpointSource,
}

impl DockerEndpoint {
    /// Resolves the endpoint from the process environment and logs it.
    pub fn detect() -> Self {
        let endpoint = Self::resolve(&EndpointEnv::from_process());
        info!(host = %endpoint.host, source = ?endpoint.source, "Docker endpoint resolved");
        endpoint
    }

    /// Resolves the endpoint from `env`.
    pub fn resolve(env: &EndpointEnv) -> Self {
        if let Some(host) = &env.docker_host {
            return Self {
                host: host.clone(),
                source: EndpointSource::Override,
            };
        }

        match env.platform {
            Platform::Unix => Self {
                host: UNIX_SOCKET.to_string(),
                source: EndpointSource::Detected,
            },
            Platform::Windows if env.windows_tcp => Self {
                host: WINDOWS_TCP.to_string(),
                source: EndpointSource::Requested,
            },
            Platform::Windows => Self {
                host: NAMED_PIPE.to_string(),
                source: EndpointSource::Detected,
            },
        }
    }

    /// The endpoint URL.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Where the endpoint came from.
    pub fn source(&self) -> EndpointSource {
        self.source
    }

    /// Points `spec` at this endpoint.
    ///
    /// A detected default is not injected; `DOCKER_HOST` is removed instead so
    /// the docker client uses its own discovery (contexts included).
    pub fn apply(&self, spec: CommandSpec) -> CommandSpec {
        match self.source {
            EndpointSource::Detected => spec.env_remove(DOCKER_HOST_VAR),
            EndpointSource::Override | EndpointSource::Requested => {
                spec.env(DOCKER_HOST_VAR, self.host.clone())
            },
        }
    }
}

impl fmt::Display for DockerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}
