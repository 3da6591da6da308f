//! Duplex WebSocket transport.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use rt_core::{parse_error_envelope, KeepAliveAction, Transport, TrackingInfo};
use uuid::Uuid;
use wire::Envelope;

use crate::dashboard_events::DashboardEvent;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if !state.hub.accepts_connections() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer, headers))
}

pub(crate) fn tracking_from(headers: &HeaderMap, peer: SocketAddr) -> TrackingInfo {
    let remote_addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| peer.to_string());
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_owned()))
        })
        .collect();
    TrackingInfo {
        remote_addr,
        user_agent,
        headers,
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr, headers: HeaderMap) {
    let tracking = tracking_from(&headers, peer);
    let remote_addr = tracking.remote_addr.clone();
    let id = Uuid::new_v4().to_string();
    let (tx, mut outbound) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();

    let Some(node) = state
        .hub
        .accept_connection(id, Transport::Duplex(tx), tracking)
    else {
        return;
    };
    state.dashboard_event(DashboardEvent::ClientConnected {
        client_id: node.id(),
        remote_addr,
    });
    tracing::info!(client_id = %node.id(), "client connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(bytes) = outbound.recv().await {
            if sink.send(Message::Binary(bytes.into())).await.is_err() {
                break;
            }
        }
    });

    // Poll at a fraction of the configured interval so the observed
    // disconnect latency stays proportional to it instead of pinned to a
    // fixed 1s granularity (which would never detect a short test interval).
    let poll_period = (node.keepalive.interval() / 4).max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(poll_period);
    let mut timed_out = false;

    // The keep-alive ticker and the socket read are driven from the same
    // `select!` loop rather than a detached task: a detached task can flip
    // `ClientNode::close()`'s internal flag but has no way to unblock
    // `stream.next()`, so the read side of an unresponsive connection would
    // never actually terminate. Racing both here lets a timeout `break` the
    // loop directly.
    loop {
        tokio::select! {
            maybe_msg = stream.next() => {
                let Some(Ok(msg)) = maybe_msg else { break };
                let bytes = match msg {
                    Message::Binary(bytes) => bytes.to_vec(),
                    Message::Text(text) => text.as_bytes().to_vec(),
                    Message::Close(_) => break,
                    _ => continue,
                };
                node.keepalive.on_inbound_frame();

                let envelope = match Envelope::decode(&bytes) {
                    Ok(envelope) => envelope,
                    Err(_) => {
                        let _ = node.send(&parse_error_envelope("malformed envelope"));
                        continue;
                    }
                };

                match envelope {
                    Envelope::Method {
                        uuid,
                        method,
                        params,
                        void,
                    } => {
                        state
                            .hub
                            .dispatch_method(node.clone(), uuid, method, params, void)
                            .await;
                    }
                    Envelope::Setup { uuid } => {
                        state.hub.reassign_identity(&node, uuid);
                    }
                    _ => {
                        let _ = node.error(
                            None,
                            Some("parse".to_owned()),
                            "unexpected envelope shape on an inbound frame",
                            None,
                        );
                    }
                }
            }
            _ = ticker.tick() => {
                match node.keepalive.tick() {
                    KeepAliveAction::SendKeepAlive => {
                        let _ = node.send_event("rpc:ping", None, None);
                    }
                    KeepAliveAction::TimedOut => {
                        timed_out = true;
                        node.close();
                        break;
                    }
                    KeepAliveAction::AlreadyClosed => break,
                    KeepAliveAction::None => {}
                }
            }
        }
    }

    writer.abort();
    state.hub.disconnect(&node);
    if timed_out {
        tracing::info!(client_id = %node.id(), "client keep-alive timed out");
        state.dashboard_event(DashboardEvent::KeepAliveTimedOut {
            client_id: node.id(),
        });
    }
    state.dashboard_event(DashboardEvent::ClientDisconnected {
        client_id: node.id(),
    });
    tracing::info!(client_id = %node.id(), "client disconnected");
}
