//! Configured repositories.

use axum::{Json, extract::State};
use serde::Serialize;
use vigil_core::{AuthMethod, DeployTarget, RepositoryConfig};

use crate::state::AppState;

/// A repository as shown over HTTP. Key paths and secret names are left out.
#[derive(Debug, Serialize)]
pub struct RepoSummary {
    pub name: String,
    pub url: String,
    pub auth_method: AuthMethod,
    pub registries: Vec<RegistrySummary>,
    pub branches: Vec<BranchSummary>,
}

#[derive(Debug, Serialize)]
pub struct RegistrySummary {
    pub url: String,
    pub public: bool,
}

#[derive(Debug, Serialize)]
pub struct BranchSummary {
    pub name: String,
    pub sync_enabled: bool,
    pub targets: Vec<DeployTarget>,
}

impl From<&RepositoryConfig> for RepoSummary {
    fn from(repo: &RepositoryConfig) -> Self {
        Self {
            name: repo.name.clone(),
            url: repo.url.clone(),
            auth_method: repo.auth_method,
            registries: repo
                .registries
                .iter()
                .map(|r| RegistrySummary {
                    url: r.url.clone(),
                    public: r.is_public(),
                })
                .collect(),
            branches: repo
                .branches
                .iter()
                .map(|b| BranchSummary {
                    name: b.name.clone(),
                    sync_enabled: b.sync_enabled,
                    targets: b.targets.clone(),
                })
                .collect(),
        }
    }
}

/// `GET /repos`
pub async fn list_repos(State(state): State<AppState>) -> Json<Vec<RepoSummary>> {
    Json(state.settings().repos.iter().map(RepoSummary::from).collect())
}
