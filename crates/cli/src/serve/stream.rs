//! Server-sent event streams.
//!
//! Each event is a single `data:` line: a JSON stage change or the bare
//! uptime in seconds. There is no replay; clients that reconnect only see
//! what is published after they do. Streams end on server shutdown.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{future, Stream, StreamExt};
use kycflow_core::{StatusEvent, StatusSubscription};
use tokio_util::sync::CancellationToken;

use super::state::AppState;

/// GET /api/v1/case/stream
pub(crate) async fn handle_case_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.workflow.subscribe();
    tracing::debug!(
        subscribers = state.workflow.publisher().subscriber_count(),
        "case stream opened"
    );
    let stream = sse_stream(subscription, state.shutdown.clone(), |_| true);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/v1/uptime/stream
pub(crate) async fn handle_uptime_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.workflow.subscribe();
    tracing::debug!(
        subscribers = state.workflow.publisher().subscriber_count(),
        "uptime stream opened"
    );
    let stream = sse_stream(
        subscription,
        state.shutdown.clone(),
        StatusEvent::is_heartbeat,
    );
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_stream(
    subscription: StatusSubscription,
    shutdown: CancellationToken,
    keep: fn(&StatusEvent) -> bool,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    subscription
        .into_stream()
        .filter(move |event| future::ready(keep(event)))
        .filter_map(|event| future::ready(to_sse(&event).map(Ok)))
        .take_until(shutdown.cancelled_owned())
}

fn to_sse(event: &StatusEvent) -> Option<Event> {
    match event.to_sse_data() {
        Ok(data) => Some(Event::default().data(data)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode status event");
            None
        }
    }
}
