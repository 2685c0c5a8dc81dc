#![allow(dead_code)]
use vigil_core::{BranchConfig, DeployTarget, RepositoryConfig};

/// Builds an HTTPS repository with one branch and the given targets.
pub fn repo(name: &str, branch: &str, targets: &[&str]) -> RepositoryConfig {
    RepositoryConfig {
        name: name.to_string(),
        url: format!("https://github.com/org/{}.git", name),
        auth_method: Default::default(),
        ssh_key_path: None,
        registries: vec![],
        branches: vec![BranchConfig {
            name: branch.to_string(),
            sync_enabled: true,
            targets: targets
                .iter()
                .map(|t| DeployTarget {
                    name: t.to_string(),
                    file: format!("{}/docker-compose.yml", t),
                    deploy: true,
                    build_images: false,
                })
                .collect(),
        }],
    }
}

/// Parses one fanned-out document.
pub fn parse(doc: &str) -> serde_json::Value {
    serde_json::from_str(doc).expect("status document is valid JSON")
}
