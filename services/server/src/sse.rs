//! One-way push transport.
//!
//! `ClientNode::send_encoded` already formats each frame as a complete
//! `id: <seq>\ndata: <payload>\n\n` record (see `client.rs`), so this handler
//! streams that text verbatim as the response body instead of re-wrapping it
//! in `axum::response::sse::Event` — doing both would double the framing.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::stream::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use rt_core::{ClientNode, Hub, Transport};

use crate::auth::CLIENT_ID_HEADER;
use crate::dashboard_events::DashboardEvent;
use crate::state::AppState;
use crate::ws::tracking_from;
use crate::ws_common::extract_token_from_headers;

pub async fn push_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if !state.hub.accepts_connections() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let tracking = tracking_from(&headers, peer);
    let remote_addr = tracking.remote_addr.clone();
    let id = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (tx, rx) = mpsc::unbounded_channel::<(u64, String)>();
    let Some(node) = state.hub.accept_connection(id, Transport::Push(tx), tracking) else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    state.dashboard_event(DashboardEvent::ClientConnected {
        client_id: node.id(),
        remote_addr: remote_addr.clone(),
    });
    tracing::info!(client_id = %node.id(), remote_addr = %remote_addr, "client connected");

    // The one-way push transport has no room for the client to call
    // `rpc:init` itself, so a bearer token presented on the connect request
    // is authenticated here instead.
    if let Some(token) = extract_token_from_headers(&headers) {
        if let Err(err) = state.hub.authenticate_node(&node, token).await {
            tracing::warn!(client_id = %node.id(), error = %err, "push transport bearer auth rejected");
        }
    }

    let stream = PushStream {
        rx,
        hub: state.hub.clone(),
        node,
        dashboard: state,
    };

    Response::builder()
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Wraps the push channel's receiver; disconnects the node from the hub when
/// the stream is dropped, which axum does as soon as the SSE client goes
/// away.
struct PushStream {
    rx: mpsc::UnboundedReceiver<(u64, String)>,
    hub: Arc<Hub>,
    node: Arc<ClientNode>,
    dashboard: AppState,
}

impl Stream for PushStream {
    type Item = Result<Bytes, std::convert::Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some((_seq, frame))) => Poll::Ready(Some(Ok(Bytes::from(frame)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PushStream {
    fn drop(&mut self) {
        self.hub.disconnect(&self.node);
        self.dashboard.dashboard_event(DashboardEvent::ClientDisconnected {
            client_id: self.node.id(),
        });
        tracing::info!(client_id = %self.node.id(), "client disconnected");
    }
}
