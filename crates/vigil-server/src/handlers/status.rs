//! Status document and live stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    http::header,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::stream::{self, Stream};
use tracing::debug;

use crate::state::AppState;

/// `GET /api/status`
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        state.store().snapshot_json(),
    )
}

/// `GET /api/status/stream`
///
/// Sends the full document once on connect and again after every change.
/// The subscription is dropped with the stream when the client goes away.
pub async fn stream_status(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.store().subscribe();
    debug!(subscribers = state.store().subscriber_count(), "Status stream opened");

    let stream = stream::unfold(subscription, |mut subscription| async move {
        let doc = subscription.recv().await?;
        Some((Ok(Event::default().data(doc)), subscription))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
