#![allow(dead_code)]
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use vigil_core::secrets::StaticSecrets;
use vigil_core::testing::ScriptedRunner;
use vigil_core::{
    BranchConfig, BranchPatch, DeployTarget, RegistryCredentialConfig, RepositoryConfig, StateStore, SyncStatus,
};
use vigil_deploy::{
    DeploymentExecutor, DockerCli, DockerEndpoint, DockerTimeouts, EndpointEnv, EnvironmentValidator, Platform,
};

pub const COMPOSE_TIMEOUT: Duration = Duration::from_secs(300);

/// A working copy with a `docker-compose.yml`.
pub fn working_copy(compose: &str) -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    write(dir.path(), "docker-compose.yml", compose);
    dir
}

pub fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write file");
}

pub fn target(name: &str) -> DeployTarget {
    DeployTarget {
        name: name.to_string(),
        file: "docker-compose.yml".to_string(),
        deploy: true,
        build_images: false,
    }
}

pub fn repo(registries: Vec<RegistryCredentialConfig>) -> RepositoryConfig {
    RepositoryConfig {
        name: "demo".to_string(),
        url: "https://github.com/org/demo.git".to_string(),
        auth_method: Default::default(),
        ssh_key_path: None,
        registries,
        branches: vec![BranchConfig {
            name: "main".to_string(),
            sync_enabled: true,
            targets: vec![target("web")],
        }],
    }
}

pub fn private_registry(url: &str, password_env_var: &str) -> RegistryCredentialConfig {
    RegistryCredentialConfig {
        url: url.to_string(),
        username: Some("deploy-bot".to_string()),
        password_env_var: Some(password_env_var.to_string()),
    }
}

pub fn public_registry(url: &str) -> RegistryCredentialConfig {
    RegistryCredentialConfig {
        url: url.to_string(),
        username: None,
        password_env_var: None,
    }
}

/// A store where `demo/main` already exists.
pub fn store() -> StateStore {
    let store = StateStore::in_memory();
    store.update_branch("demo", "main", BranchPatch::new().sync_status(SyncStatus::Idle));
    store
}

pub fn executor(runner: Arc<ScriptedRunner>, secrets: StaticSecrets, env: &[(&str, &str)], store: StateStore) -> DeploymentExecutor {
    let endpoint = DockerEndpoint::resolve(&EndpointEnv {
        docker_host: None,
        platform: Platform::Unix,
        windows_tcp: false,
    });
    let docker = DockerCli::new(
        runner,
        endpoint,
        Arc::new(secrets),
        DockerTimeouts {
            daemon: Some(Duration::from_secs(10)),
            compose: Some(COMPOSE_TIMEOUT),
        },
    );
    let validator = EnvironmentValidator::with_process_env(env.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    DeploymentExecutor::new(Arc::new(docker), validator, store)
}

/// Parses one fanned-out document.
pub fn parse(doc: &str) -> serde_json::Value {
    serde_json::from_str(doc).expect("status document is valid JSON")
}
