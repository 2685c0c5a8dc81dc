//! The docker CLI.
//!
//! Every docker invocation is built here so that endpoint selection and
//! timeouts are applied the same way for probes, logins and compose runs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vigil_core::{CommandOutput, CommandRunner, CommandSpec, DeployTarget, RegistryCredentialConfig, SecretProvider};

use crate::endpoint::DockerEndpoint;
use crate::error::DeploymentError;

const DOCKER: &str = "docker";

/// Timeouts for each class of docker call. `None` waits indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DockerTimeouts {
    /// `docker info`, `login` and `logout`.
    pub daemon: Option<Duration>,
    /// `docker compose up` and `ps`.
    pub compose: Option<Duration>,
}

/// Result of logging into a repository's registries.
#[derive(Debug, Default)]
pub struct RegistryLogin {
    logged_in: Vec<String>,
    failure: Option<DeploymentError>,
}

impl RegistryLogin {
    /// Returns true if every private registry was logged into.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Registries that were logged into and need a logout.
    pub fn logged_in(&self) -> &[String] {
        &self.logged_in
    }

    /// The failure that stopped the logins, if any.
    pub fn failure(&self) -> Option<&DeploymentError> {
        self.failure.as_ref()
    }
}

/// Runs docker commands against the resolved endpoint.
pub struct DockerCli {
    runner: Arc<dyn CommandRunner>,
    endpoint: DockerEndpoint,
    secrets: Arc<dyn SecretProvider>,
    timeouts: DockerTimeouts,
}

impl DockerCli {
    /// Creates a docker CLI wrapper.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        endpoint: DockerEndpoint,
        secrets: Arc<dyn SecretProvider>,
        timeouts: DockerTimeouts,
    ) -> Self {
        Self {
            runner,
            endpoint,
            secrets,
            timeouts,
        }
    }

    /// The endpoint commands are sent to.
    pub fn endpoint(&self) -> &DockerEndpoint {
        &self.endpoint
    }

    fn command(&self) -> Result<CommandSpec, DeploymentError> {
        let program = self
            .runner
            .locate(DOCKER)
            .ok_or_else(|| DeploymentError::ExecutableNotFound {
                program: DOCKER.to_string(),
            })?;
        Ok(self
            .endpoint
            .apply(CommandSpec::new(program.to_string_lossy())))
    }

    /// Probes the daemon with `docker info`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutableNotFound` if docker is not installed and
    /// `DaemonUnavailable` if the probe fails or times out.
    pub async fn ensure_daemon(&self) -> Result<(), DeploymentError> {
        let spec = self.command()?.arg("info").timeout(self.timeouts.daemon);

        match self.runner.run(&spec).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(DeploymentError::daemon_unavailable(output.failure_excerpt(200))),
            Err(e) if e.is_not_found() => Err(DeploymentError::ExecutableNotFound {
                program: DOCKER.to_string(),
            }),
            Err(e) => Err(DeploymentError::daemon_unavailable(e.to_string())),
        }
    }

    /// Returns true if the daemon answers.
    pub async fn daemon_available(&self) -> bool {
        match self.ensure_daemon().await {
            Ok(()) => true,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Docker daemon check failed");
                false
            },
        }
    }

    /// Logs into every private registry, in order.
    ///
    /// Public registries are skipped. The first failure stops the remaining
    /// logins; registries already logged into are reported so the caller can
    /// log out of them.
    pub async fn login_registries(&self, registries: &[RegistryCredentialConfig]) -> RegistryLogin {
        let mut login = RegistryLogin::default();

        for registry in registries {
            let Some(username) = registry.username.as_deref() else {
                debug!(registry = %registry.url, "Skipping login for public registry");
                continue;
            };

            match self.login(registry, username).await {
                Ok(()) => {
                    info!(registry = %registry.url, "Logged into registry");
                    login.logged_in.push(registry.url.clone());
                },
                Err(e) => {
                    warn!(registry = %registry.url, error = %e, "Registry login failed");
                    login.failure = Some(e);
                    break;
                },
            }
        }

        login
    }

    async fn login(&self, registry: &RegistryCredentialConfig, username: &str) -> Result<(), DeploymentError> {
        let secret_key = registry.password_env_var.as_deref().unwrap_or_default();
        let password = self
            .secrets
            .get_secret(secret_key)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                DeploymentError::registry_login(
                    &registry.url,
                    format!("password secret '{}' is not set", secret_key),
                )
            })?;

        let spec = self
            .command()?
            .args(["login", "--username", username, "--password-stdin"])
            .arg(registry.url.as_str())
            .stdin(password)
            .timeout(self.timeouts.daemon);

        let output = self.runner.run(&spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(DeploymentError::registry_login(
                &registry.url,
                output.failure_excerpt(200),
            ))
        }
    }

    /// Logs out of `registries`. Failures are logged and otherwise ignored.
    pub async fn logout_registries(&self, registries: &[String]) {
        for registry in registries {
            let result = match self.command() {
                Ok(spec) => {
                    let spec = spec
                        .args(["logout", registry.as_str()])
                        .timeout(self.timeouts.daemon);
                    self.runner.run(&spec).await.map_err(DeploymentError::from)
                },
                Err(e) => Err(e),
            };

            match result {
                Ok(output) if output.success() => {
                    debug!(registry = %registry, "Logged out of registry");
                },
                Ok(output) => warn!(
                    registry = %registry,
                    error = %output.failure_excerpt(200),
                    "Registry logout failed"
                ),
                Err(e) => warn!(registry = %registry, error = %e, "Registry logout failed"),
            }
        }
    }

    fn compose(&self, project: &str, file: &str, working_dir: &Path) -> Result<CommandSpec, DeploymentError> {
        Ok(self
            .command()?
            .args(["compose", "-p", project, "-f", file])
            .current_dir(working_dir)
            .timeout(self.timeouts.compose))
    }

    /// Runs `docker compose up -d` for `target`.
    ///
    /// A non-zero exit is returned as output, not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if docker could not be run or timed out.
    pub async fn compose_up(
        &self,
        project: &str,
        target: &DeployTarget,
        working_dir: &Path,
    ) -> Result<CommandOutput, DeploymentError> {
        let mut spec = self
            .compose(project, &target.file, working_dir)?
            .args(["up", "-d"]);
        if target.build_images {
            spec = spec.arg("--build");
        }
        let spec = spec.arg("--remove-orphans");

        info!(project = %project, command = %spec.display(), "Running compose up");
        Ok(self.runner.run(&spec).await?)
    }

    /// Lists the running services of a compose project.
    ///
    /// # Errors
    ///
    /// Returns an error if docker could not be run or timed out.
    pub async fn compose_running_services(
        &self,
        project: &str,
        file: &str,
        working_dir: &Path,
    ) -> Result<CommandOutput, DeploymentError> {
        let spec = self
            .compose(project, file, working_dir)?
            .args(["ps", "--services", "--filter", "status=running"]);
        Ok(self.runner.run(&spec).await?)
    }
}

impl std::fmt::Debug for DockerCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerCli")
            .field("endpoint", &self.endpoint)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointEnv, Platform};
    use vigil_core::secrets::StaticSecrets;
    use vigil_core::testing::ScriptedRunner;
    use vigil_core::CommandError;

    fn docker(runner: Arc<ScriptedRunner>, secrets: StaticSecrets) -> DockerCli {
        let endpoint = DockerEndpoint::resolve(&EndpointEnv {
            docker_host: None,
            platform: Platform::Unix,
            windows_tcp: false,
        });
        DockerCli::new(
            runner,
            endpoint,
            Arc::new(secrets),
            DockerTimeouts {
                daemon: Some(Duration::from_secs(10)),
                compose: Some(Duration::from_secs(300)),
            },
        )
    }

    fn registry(url: &str, username: Option<&str>, password_env_var: Option<&str>) -> RegistryCredentialConfig {
        RegistryCredentialConfig {
            url: url.to_string(),
            username: username.map(String::from),
            password_env_var: password_env_var.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_login_skips_public_and_stops_on_missing_password() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let cli = docker(runner.clone(), StaticSecrets::default());

        let login = cli
            .login_registries(&[
                registry("docker.io", None, None),
                registry("ghcr.io", Some("bot"), Some("GHCR_PASSWORD")),
            ])
            .await;

        assert!(!login.succeeded());
        assert!(login.logged_in().is_empty());
        assert!(matches!(login.failure(), Some(DeploymentError::RegistryLogin { .. })));
        assert_eq!(runner.count(|spec| spec.has_arg("login")), 0);
    }

    #[tokio::test]
    async fn test_login_passes_password_on_stdin() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let secrets = StaticSecrets::from_iter([("GHCR_PASSWORD", "hunter2")]);
        let cli = docker(runner.clone(), secrets);

        let login = cli
            .login_registries(&[registry("ghcr.io", Some("bot"), Some("GHCR_PASSWORD"))])
            .await;

        assert!(login.succeeded());
        assert_eq!(login.logged_in(), ["ghcr.io".to_string()]);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].stdin.as_deref(), Some("hunter2"));
        assert!(!calls[0].args.iter().any(|a| a.contains("hunter2")));
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_login_failure_keeps_earlier_logins() {
        let runner = Arc::new(ScriptedRunner::new(|spec| {
            if spec.has_arg("registry.b.example") {
                Ok(CommandOutput::failed(1, "unauthorized: incorrect username or password"))
            } else {
                Ok(CommandOutput::ok("Login Succeeded"))
            }
        }));
        let secrets = StaticSecrets::from_iter([("A_PASS", "a"), ("B_PASS", "b")]);
        let cli = docker(runner.clone(), secrets);

        let login = cli
            .login_registries(&[
                registry("registry.a.example", Some("a"), Some("A_PASS")),
                registry("registry.b.example", Some("b"), Some("B_PASS")),
                registry("registry.c.example", Some("c"), Some("A_PASS")),
            ])
            .await;

        assert!(!login.succeeded());
        assert_eq!(login.logged_in(), ["registry.a.example".to_string()]);
        assert!(
            login
                .failure()
                .map(|e| e.to_string().contains("unauthorized"))
                .unwrap_or(false)
        );
        assert_eq!(runner.count(|spec| spec.has_arg("registry.c.example")), 0);
    }

    #[tokio::test]
    async fn test_logout_failures_are_ignored() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Err(CommandError::TimedOut {
                program: "docker".to_string(),
                timeout: Duration::from_secs(10),
            })
        }));
        let cli = docker(runner.clone(), StaticSecrets::default());

        cli.logout_registries(&["a.example".to_string(), "b.example".to_string()])
            .await;

        assert_eq!(runner.count(|spec| spec.has_arg("logout")), 2);
    }

    #[tokio::test]
    async fn test_compose_up_arguments() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let cli = docker(runner.clone(), StaticSecrets::default());
        let target = DeployTarget {
            name: "web".to_string(),
            file: "deploy/compose.yml".to_string(),
            deploy: true,
            build_images: true,
        };

        let output = cli
            .compose_up("demo_main_web", &target, Path::new("/srv/demo"))
            .await
            .unwrap();
        assert!(output.success());

        let calls = runner.calls();
        assert_eq!(
            calls[0].args,
            [
                "compose",
                "-p",
                "demo_main_web",
                "-f",
                "deploy/compose.yml",
                "up",
                "-d",
                "--build",
                "--remove-orphans"
            ]
        );
        assert_eq!(calls[0].cwd.as_deref(), Some(Path::new("/srv/demo")));
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(300)));
        assert_eq!(calls[0].env_remove, ["DOCKER_HOST".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_docker() {
        let runner = Arc::new(ScriptedRunner::succeeding().without_program("docker"));
        let cli = docker(runner.clone(), StaticSecrets::default());

        let err = cli.ensure_daemon().await.unwrap_err();
        assert!(matches!(err, DeploymentError::ExecutableNotFound { .. }));
        assert!(!cli.daemon_available().await);
        assert!(runner.calls().is_empty());
    }
}
