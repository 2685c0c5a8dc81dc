use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub health: String,
    pub timestamp: DateTime<Utc>,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            health: "ok".to_string(),
            timestamp: Utc::now(),
        }
    }
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}
