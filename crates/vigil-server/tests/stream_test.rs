//! Status stream integration tests.

mod helpers;

use std::time::Duration;

use axum::{body::Body, http::Request};
use helpers::TestApp;
use http_body_util::BodyExt;
use vigil_core::{BranchPatch, SyncStatus};

/// Lee el siguiente frame de datos como texto.
async fn next_frame(body: &mut Body) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("no frame within timeout")
            .expect("stream ended")
            .expect("frame error");
        if let Ok(data) = frame.into_data() {
            let text = String::from_utf8(data.to_vec()).unwrap();
            // Keep-alive comments carry no document.
            if text.starts_with("data:") {
                return text;
            }
        }
    }
}

fn document(frame: &str) -> serde_json::Value {
    let data = frame
        .strip_prefix("data: ")
        .expect("data frame")
        .trim_end();
    serde_json::from_str(data).unwrap()
}

async fn open_stream(app: &TestApp) -> Body {
    let response = app
        .client
        .raw(
            Request::builder()
                .uri("/api/status/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    response.into_body()
}

#[tokio::test]
async fn test_initial_document() {
    let app = TestApp::new();
    let mut body = open_stream(&app).await;

    let first = next_frame(&mut body).await;
    assert_eq!(first, "data: {}\n\n");
}

#[tokio::test]
async fn test_document_per_mutation() {
    let app = TestApp::new();
    let mut body = open_stream(&app).await;
    next_frame(&mut body).await;

    app.store.update_branch(
        "demo",
        "main",
        BranchPatch::new().sync_status(SyncStatus::Checking),
    );
    app.store.update_branch(
        "demo",
        "main",
        BranchPatch::new().sync_status(SyncStatus::Pulling),
    );

    let checking = document(&next_frame(&mut body).await);
    assert_eq!(checking["demo"]["branches"]["main"]["sync_status"], "checking");

    let pulling = document(&next_frame(&mut body).await);
    assert_eq!(pulling["demo"]["branches"]["main"]["sync_status"], "pulling");
}

#[tokio::test]
async fn test_disconnect_unsubscribes() {
    let app = TestApp::new();
    let mut body = open_stream(&app).await;
    next_frame(&mut body).await;
    assert_eq!(app.store.subscriber_count(), 1);

    drop(body);
    assert_eq!(app.store.subscriber_count(), 0);

    // Mutations after the disconnect still succeed.
    app.store.update_branch(
        "demo",
        "main",
        BranchPatch::new().sync_status(SyncStatus::Idle),
    );
    assert!(app.store.branch("demo", "main").is_some());
}

#[tokio::test]
async fn test_independent_subscribers() {
    let app = TestApp::new();
    let mut first = open_stream(&app).await;
    let mut second = open_stream(&app).await;
    next_frame(&mut first).await;
    next_frame(&mut second).await;
    assert_eq!(app.store.subscriber_count(), 2);

    app.store
        .update_branch("demo", "main", BranchPatch::new().commit_hash("abc1234"));

    for body in [&mut first, &mut second] {
        let doc = document(&next_frame(body).await);
        assert_eq!(doc["demo"]["branches"]["main"]["commit_hash"], "abc1234");
    }
}
