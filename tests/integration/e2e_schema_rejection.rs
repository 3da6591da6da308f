//! Scenario 3 (spec §8): a method schema rejects non-conforming params with
//! a `schema-validation` error carrying a non-empty field-error list, and
//! the handler never runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use realtime_hub::{
    DispatchError, FieldKind, FieldSchema, FnHandler, Hub, HubConfig, MethodOptions, Schema, Value,
};
use rt_test_utils::{EnvelopeWsClient, TestServer};
use wire::Envelope;

#[tokio::test]
async fn schema_violation_is_rejected_before_the_handler_runs() {
    let hub = Hub::new(HubConfig::default(), None);
    let handler_ran = Arc::new(AtomicBool::new(false));
    let flag = handler_ran.clone();

    let schema = Schema::new().field("n", FieldSchema::required(FieldKind::Integer));
    hub.add_method(
        "ping",
        Arc::new(FnHandler(move |_node, _params: Option<Value>| {
            flag.store(true, Ordering::SeqCst);
            async move { Ok::<Value, DispatchError>(Value::Null) }
        })),
        MethodOptions {
            schema: Some(schema),
            ..Default::default()
        },
    );

    let server = TestServer::spawn(realtime_hub::build_router(realtime_hub::AppState::new(hub))).await;
    let mut client = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();

    let call = Envelope::new_method(
        "ping",
        Some(Value::object([("n".to_owned(), Value::Str("x".to_owned()))])),
        false,
    );
    client.send(&call).await.unwrap();

    match client.recv().await.unwrap() {
        Envelope::Error { code, errors, .. } => {
            assert_eq!(code.as_deref(), Some("schema-validation"));
            let errors = errors.expect("expected a field-error list");
            assert!(!errors.is_empty());
            assert_eq!(errors[0].field, "n");
        }
        other => panic!("expected a schema-validation error, got {other:?}"),
    }

    assert!(!handler_ran.load(Ordering::SeqCst), "handler must not run on schema rejection");
}
