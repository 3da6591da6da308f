//! The request-response transports (spec §6): a client that cannot hold a
//! duplex socket open pairs a one-envelope-per-request POST (`/_call`) for
//! method calls with a one-way push stream (`/_push`) for events, both keyed
//! by the same client-generated identity header. The push stream must be
//! established first so later `/_call` requests under the same identity
//! reuse the existing node (and its push transport) instead of replacing it.

use std::sync::Arc;

use realtime_hub::{AppState, DispatchError, FnHandler, Hub, HubConfig, Value};
use rt_test_utils::TestServer;
use wire::Envelope;

const CLIENT_ID_HEADER: &str = "x-client-id";

#[tokio::test]
async fn post_call_and_push_stream_share_one_client_identity() {
    let hub = Hub::new(HubConfig::default(), None);
    hub.add_method(
        "echo",
        Arc::new(FnHandler(|_node, params: Option<Value>| async move {
            Ok::<Value, DispatchError>(params.unwrap_or(Value::Null))
        })),
        Default::default(),
    );
    hub.add_event("tick", rt_core::EventOptions::default());
    let emitter = hub.clone();

    let server = TestServer::spawn(realtime_hub::build_router(AppState::new(hub))).await;
    let http = reqwest::Client::new();

    // A call-only client with no push stream works over `/_call` alone.
    let call = Envelope::new_method("echo", Some(Value::Int(7)), false);
    let response = http
        .post(server.http_url("/_call"))
        .header(CLIENT_ID_HEADER, "call-only-client")
        .body(call.encode().unwrap())
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body = response.bytes().await.unwrap();
    match Envelope::decode(&body).unwrap() {
        Envelope::Result { result, .. } => assert_eq!(result, Value::Int(7)),
        other => panic!("expected a result envelope, got {other:?}"),
    }

    // A push client opens its SSE stream first, establishing the node...
    let mut push = http
        .get(server.http_url("/_push"))
        .header(CLIENT_ID_HEADER, "push-client")
        .send()
        .await
        .unwrap();
    assert_eq!(
        push.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // ...then subscribes over `/_call` under the same identity, which must
    // reuse the node the push stream created rather than replace it.
    let subscribe = Envelope::new_method(
        "rpc:on",
        Some(Value::object([("event".to_owned(), Value::Str("tick".to_owned()))])),
        false,
    );
    let response = http
        .post(server.http_url("/_call"))
        .header(CLIENT_ID_HEADER, "push-client")
        .body(subscribe.encode().unwrap())
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    emitter.emit("tick", None, Some(Value::Int(1))).await;

    let chunk = tokio::time::timeout(std::time::Duration::from_secs(2), push.chunk())
        .await
        .expect("push stream should yield a frame")
        .unwrap();
    let frame = chunk.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    assert!(frame.is_some(), "expected an SSE frame from the push transport");
    let frame = frame.unwrap();
    assert!(frame.starts_with("id: "), "frame should carry a sequence id: {frame:?}");
    assert!(frame.contains("data: "), "frame should carry a data field: {frame:?}");
}
