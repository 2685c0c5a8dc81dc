//! GitHub push webhooks.
//!
//! A verified `push` for a configured, sync-enabled branch queues a pass on
//! that branch's lane. The pass itself runs in the background; the response
//! only says whether one was queued.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::sync::TriggerOutcome;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex hmac>` of the raw body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header naming the event type.
pub const EVENT_HEADER: &str = "x-github-event";

const BRANCH_REF_PREFIX: &str = "refs/heads/";

#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    repository: Option<PushRepository>,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub message: String,
}

/// `POST /webhooks/github`
#[instrument(skip_all)]
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let Some(secret) = state.webhook_secret() else {
        warn!("Webhook received but no webhook secret is configured");
        return Err(AppError::Unauthorized(
            "Webhook secret not configured".to_string(),
        ));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing signature".to_string()))?;

    if !verify_signature(secret.as_bytes(), &body, signature) {
        warn!("Webhook signature mismatch");
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if event != "push" {
        debug!(event = %event, "Ignoring webhook event");
        return Ok(Json(WebhookResponse {
            status: "ignored",
            repo: None,
            branch: None,
            message: format!("Event '{}' is not handled", event),
        }));
    }

    let push: PushEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON payload: {}", e)))?;

    let repo = push
        .repository
        .and_then(|r| r.name)
        .ok_or_else(|| AppError::BadRequest("Missing repository.name".to_string()))?;
    let branch = push
        .git_ref
        .as_deref()
        .and_then(|r| r.strip_prefix(BRANCH_REF_PREFIX))
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("ref is not a branch".to_string()))?;

    let (status, message) = match state.scheduler().trigger(&repo, &branch) {
        TriggerOutcome::Triggered => ("processing", "Reconciliation queued".to_string()),
        TriggerOutcome::AlreadyQueued => (
            "processing",
            "Reconciliation already queued".to_string(),
        ),
        TriggerOutcome::Unknown => (
            "skipped",
            "Repository or branch is not configured for sync".to_string(),
        ),
    };
    info!(repo = %repo, branch = %branch, status, "Push webhook handled");

    Ok(Json(WebhookResponse {
        status,
        repo: Some(repo),
        branch: Some(branch),
        message,
    }))
}

/// Checks a `sha256=<hex>` signature over `body` in constant time.
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the `sha256=<hex>` signature GitHub sends for `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(body);
            format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
        },
        Err(_) => String::new(),
    }
}
