//! Scenario 1 (spec §8): register `sum`, call it over the duplex transport,
//! and expect a `result` envelope correlated to the original call carrying
//! `a + b`.

use std::sync::Arc;

use realtime_hub::{AppState, DispatchError, FnHandler, Hub, HubConfig, MethodOptions, Value};
use rt_test_utils::{EnvelopeWsClient, TestServer};
use wire::Envelope;

fn sum_handler() -> Arc<dyn realtime_hub::MethodHandler> {
    Arc::new(FnHandler(|_node, params: Option<Value>| async move {
        let obj = params
            .as_ref()
            .and_then(Value::as_object)
            .ok_or_else(|| DispatchError::Public("params must be an object".to_owned()))?;
        let a = match obj.get("a") {
            Some(Value::Int(n)) => *n,
            _ => return Err(DispatchError::Public("missing integer `a`".to_owned())),
        };
        let b = match obj.get("b") {
            Some(Value::Int(n)) => *n,
            _ => return Err(DispatchError::Public("missing integer `b`".to_owned())),
        };
        Ok(Value::Int(a + b))
    }))
}

#[tokio::test]
async fn sum_method_call_roundtrips_with_correlation_id() {
    let hub = Hub::new(HubConfig::default(), None);
    hub.add_method("sum", sum_handler(), MethodOptions::default());

    let server = TestServer::spawn(realtime_hub::build_router(AppState::new(hub))).await;
    let mut client = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();

    let call = Envelope::new_method(
        "sum",
        Some(Value::object([
            ("a".to_owned(), Value::Int(1)),
            ("b".to_owned(), Value::Int(2)),
        ])),
        false,
    );
    let expected_uuid = call.correlation_id().unwrap().to_owned();
    client.send(&call).await.unwrap();

    match client.recv().await.unwrap() {
        Envelope::Result { uuid, method, result } => {
            assert_eq!(uuid, expected_uuid);
            assert_eq!(method, "sum");
            assert_eq!(result, Value::Int(3));
        }
        other => panic!("expected a result envelope, got {other:?}"),
    }
}
