//! Operational SSE stream: a read-only feed of connection/disconnection and
//! log events for a dashboard, distinct from the client-facing event
//! subsystem in `rt-core`.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

pub async fn dashboard_sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.dashboard_tx.subscribe())
        .filter_map(|result| result.ok())
        .map(|event| {
            let ev = Event::default().json_data(&event).unwrap_or_else(|_| {
                Event::default().data("serialization_error")
            });
            Ok(ev)
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
