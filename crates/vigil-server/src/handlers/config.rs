//! Non-sensitive settings.

use std::path::PathBuf;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub check_interval_minutes: u64,
    pub git_retry_count: u32,
    pub retry_backoff_factor: f64,
    pub docker_compose_timeout_seconds: u64,
    pub git_operation_timeout_seconds: u64,
    pub docker_daemon_timeout_seconds: u64,
    pub repo_base_path: PathBuf,
    pub status_file: PathBuf,
    pub log_level: String,
    pub repos_count: usize,
}

/// `GET /api/config`
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let settings = state.settings();
    Json(ConfigResponse {
        check_interval_minutes: settings.scheduling.check_interval_minutes,
        git_retry_count: settings.scheduling.git_retry_count,
        retry_backoff_factor: settings.scheduling.retry_backoff_factor,
        docker_compose_timeout_seconds: settings.deployment.docker_compose_timeout_seconds,
        git_operation_timeout_seconds: settings.deployment.git_operation_timeout_seconds,
        docker_daemon_timeout_seconds: settings.deployment.docker_daemon_timeout_seconds,
        repo_base_path: settings.paths.repo_base_path.clone(),
        status_file: settings.paths.status_file.clone(),
        log_level: settings.logging.level.clone(),
        repos_count: settings.repos.len(),
    })
}
