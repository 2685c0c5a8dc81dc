//! GitHub webhook integration tests.

mod helpers;

use std::time::Duration;

use axum::http::StatusCode;
use helpers::{TestApp, WEBHOOK_SECRET};
use vigil_core::secrets::StaticSecrets;
use vigil_server::handlers::webhook::{EVENT_HEADER, SIGNATURE_HEADER, sign};

fn push_body(repo: &str, git_ref: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "ref": git_ref,
        "after": "abc1234def5678",
        "repository": { "name": repo, "full_name": format!("org/{}", repo) }
    }))
    .unwrap()
}

async fn deliver(app: &TestApp, event: &str, body: &[u8]) -> helpers::TestResponse {
    let signature = sign(WEBHOOK_SECRET.as_bytes(), body);
    app.client
        .post(
            "/webhooks/github",
            vec![
                (SIGNATURE_HEADER, signature.as_str()),
                (EVENT_HEADER, event),
                ("content-type", "application/json"),
            ],
            body,
        )
        .await
}

/// Espera hasta que el reconciler haya visto `expected` pasadas.
async fn wait_for_calls(app: &TestApp, expected: usize) -> usize {
    for _ in 0..100 {
        let calls = app.reconciler.calls_for("demo", "main");
        if calls >= expected {
            return calls;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    app.reconciler.calls_for("demo", "main")
}

#[tokio::test]
async fn test_push_queues_pass() {
    let app = TestApp::new();
    wait_for_calls(&app, 1).await;

    let response = deliver(&app, "push", &push_body("demo", "refs/heads/main")).await;
    response.assert_status(StatusCode::OK);

    let json = response.json();
    assert_eq!(json["status"], "processing");
    assert_eq!(json["repo"], "demo");
    assert_eq!(json["branch"], "main");

    assert_eq!(wait_for_calls(&app, 2).await, 2);
}

#[tokio::test]
async fn test_missing_signature() {
    let app = TestApp::new();

    let response = app
        .client
        .post(
            "/webhooks/github",
            vec![(EVENT_HEADER, "push")],
            &push_body("demo", "refs/heads/main"),
        )
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "Unauthorized");
}

#[tokio::test]
async fn test_invalid_signature() {
    let app = TestApp::new();
    let body = push_body("demo", "refs/heads/main");
    let forged = sign(b"wrong-secret", &body);

    let response = app
        .client
        .post(
            "/webhooks/github",
            vec![(SIGNATURE_HEADER, forged.as_str()), (EVENT_HEADER, "push")],
            &body,
        )
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_body() {
    let app = TestApp::new();
    let signature = sign(
        WEBHOOK_SECRET.as_bytes(),
        &push_body("demo", "refs/heads/main"),
    );

    let response = app
        .client
        .post(
            "/webhooks/github",
            vec![(SIGNATURE_HEADER, signature.as_str()), (EVENT_HEADER, "push")],
            &push_body("demo", "refs/heads/legacy"),
        )
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_secret_not_configured() {
    let app = TestApp::with_secrets(StaticSecrets::default());

    let response = deliver(&app, "push", &push_body("demo", "refs/heads/main")).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_push_event_ignored() {
    let app = TestApp::new();

    let response = deliver(&app, "ping", br#"{"zen":"Design for failure."}"#).await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json()["status"], "ignored");
}

#[tokio::test]
async fn test_tag_push_rejected() {
    let app = TestApp::new();

    let response = deliver(&app, "push", &push_body("demo", "refs/tags/v1.0.0")).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Bad Request");
}

#[tokio::test]
async fn test_invalid_json() {
    let app = TestApp::new();

    let response = deliver(&app, "push", b"not json").await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_repository_name() {
    let app = TestApp::new();

    let response = deliver(&app, "push", br#"{"ref":"refs/heads/main"}"#).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unconfigured_pairs_skipped() {
    let app = TestApp::new();

    let unknown_repo = deliver(&app, "push", &push_body("other", "refs/heads/main")).await;
    unknown_repo.assert_status(StatusCode::OK);
    assert_eq!(unknown_repo.json()["status"], "skipped");

    let disabled_branch = deliver(&app, "push", &push_body("demo", "refs/heads/legacy")).await;
    disabled_branch.assert_status(StatusCode::OK);
    assert_eq!(disabled_branch.json()["status"], "skipped");

    assert!(!app.scheduler.has_lane("demo", "legacy"));
}
