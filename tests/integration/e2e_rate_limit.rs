//! Rate limiter testable property (spec §8): at most k calls per interval I
//! succeed; excess calls within the same window receive
//! `rate-limit-exceeded` without running the handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use realtime_hub::{AppState, DispatchError, FnHandler, Hub, HubConfig, MethodOptions, Value};
use rt_test_utils::{EnvelopeWsClient, TestServer};
use wire::Envelope;

#[tokio::test]
async fn excess_calls_within_the_window_are_rate_limited() {
    let hub = Hub::new(HubConfig::default(), None);
    let invocations = Arc::new(AtomicU32::new(0));
    let counter = invocations.clone();
    hub.add_method(
        "noop",
        Arc::new(FnHandler(move |_node, _params: Option<Value>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<Value, DispatchError>(Value::Null) }
        })),
        MethodOptions::default(),
    );

    let server = TestServer::spawn(realtime_hub::build_router(AppState::new(hub))).await;
    let mut client = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();

    // The default bucket holds 120 tokens; all of these succeed.
    for _ in 0..120 {
        let call = Envelope::new_method("noop", None, false);
        client.send(&call).await.unwrap();
        match client.recv().await.unwrap() {
            Envelope::Result { .. } => {}
            other => panic!("expected noop to succeed within the limit, got {other:?}"),
        }
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 120);

    let call = Envelope::new_method("noop", None, false);
    client.send(&call).await.unwrap();
    match client.recv().await.unwrap() {
        Envelope::Error { code, .. } => assert_eq!(code.as_deref(), Some("rate-limit-exceeded")),
        other => panic!("expected the 121st call to be rate-limited, got {other:?}"),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 120, "handler must not run once rate-limited");
}
