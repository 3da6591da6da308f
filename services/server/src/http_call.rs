//! One-envelope-per-request method call transport: the request-response
//! counterpart to the duplex and push transports, used by clients that pair
//! a POST call with a separately-established SSE push stream (or that only
//! ever need request/response and never subscribe to anything).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;
use wire::Envelope;

use rt_core::Transport;

use crate::state::AppState;
use crate::ws::tracking_from;
use crate::ws_common::extract_client_id;

const REPLY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub async fn call_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.hub.accepts_connections() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let envelope = match Envelope::decode(&body) {
        Ok(envelope) => envelope,
        Err(_) => return (StatusCode::BAD_REQUEST, "malformed envelope").into_response(),
    };
    let Envelope::Method { uuid, method, params, void } = envelope else {
        return (StatusCode::BAD_REQUEST, "expected a method envelope").into_response();
    };

    let id = extract_client_id(&headers).unwrap_or_else(|| Uuid::new_v4().to_string());

    let node = match state.hub.client(&id) {
        Some(node) => node,
        None => {
            let tracking = tracking_from(&headers, peer);
            match state.hub.accept_connection(id, Transport::None, tracking) {
                Some(node) => node,
                None => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
            }
        }
    };

    // Swap in a throwaway duplex transport to capture the single reply this
    // call produces, then restore whatever transport (push, or none) the
    // node already had. `with_temporary_transport` holds a per-node lock for
    // the duration, so two overlapping `/_call` requests against the same
    // client id queue instead of racing on the node's shared transport field
    // and cross-wiring each other's replies.
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let reply = node
        .with_temporary_transport(Transport::Duplex(tx), || async {
            state
                .hub
                .dispatch_method(node.clone(), uuid, method, params, void)
                .await;
            if void {
                None
            } else {
                tokio::time::timeout(REPLY_TIMEOUT, rx.recv()).await.ok().flatten()
            }
        })
        .await;

    match reply {
        Some(bytes) => ([("content-type", "application/octet-stream")], bytes).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
