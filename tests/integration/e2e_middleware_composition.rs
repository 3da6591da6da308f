//! Scenario 2 (spec §8): two middlewares each contribute a field to `params`
//! before the handler sees them; the dispatcher merges object contributions
//! in registration order (spec §4.6 step 5, §9 "Middleware return-value
//! merging").

use std::sync::Arc;

use realtime_hub::{
    DispatchError, FnHandler, FnMiddleware, Hub, HubConfig, MethodOptions, Value,
};
use rt_test_utils::{EnvelopeWsClient, TestServer};
use wire::Envelope;

#[tokio::test]
async fn middleware_contributions_merge_into_params_in_order() {
    let hub = Hub::new(HubConfig::default(), None);

    let middleware1: Arc<dyn realtime_hub::Middleware> =
        Arc::new(FnMiddleware(|_node, _params: Option<Value>| async move {
            Ok(Value::object([("hello".to_owned(), Value::Bool(true))]))
        }));
    let middleware2: Arc<dyn realtime_hub::Middleware> =
        Arc::new(FnMiddleware(|_node, _params: Option<Value>| async move {
            Ok(Value::object([("world".to_owned(), Value::Bool(true))]))
        }));
    let handler = Arc::new(FnHandler(|_node, params: Option<Value>| async move {
        Ok::<Value, DispatchError>(params.unwrap_or(Value::Null))
    }));

    hub.add_method(
        "greet",
        handler,
        MethodOptions {
            middleware: vec![middleware1, middleware2],
            ..Default::default()
        },
    );

    let server = TestServer::spawn(realtime_hub::build_router(realtime_hub::AppState::new(hub))).await;
    let mut client = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();

    let call = Envelope::new_method("greet", Some(Value::object([])), false);
    client.send(&call).await.unwrap();

    match client.recv().await.unwrap() {
        Envelope::Result { result, .. } => {
            let obj = result.as_object().expect("result should be an object");
            assert_eq!(obj.get("hello"), Some(&Value::Bool(true)));
            assert_eq!(obj.get("world"), Some(&Value::Bool(true)));
        }
        other => panic!("expected a result envelope, got {other:?}"),
    }
}
