//! Scenario 6 (spec §8): a `user=true` event may only be subscribed on a
//! channel equal to the authenticated subscriber's own user id.

use std::sync::Arc;

use realtime_hub::{AppState, AuthFn, AuthOutcome, EventOptions, Hub, HubConfig, Value};
use rt_test_utils::{EnvelopeWsClient, TestServer};
use wire::Envelope;

fn auth_context_for(user_id: &str) -> Value {
    Value::object([(
        "user".to_owned(),
        Value::object([("id".to_owned(), Value::Str(user_id.to_owned()))]),
    )])
}

fn token_is_user_id(token: String) -> futures_util::future::BoxFuture<'static, AuthOutcome> {
    Box::pin(async move {
        if token.is_empty() {
            AuthOutcome::Rejected
        } else {
            AuthOutcome::Accepted(auth_context_for(&token))
        }
    })
}

async fn init(client: &mut EnvelopeWsClient, token: &str) {
    let call = Envelope::new_method(
        "rpc:init",
        Some(Value::object([("token".to_owned(), Value::Str(token.to_owned()))])),
        false,
    );
    client.send(&call).await.unwrap();
    match client.recv().await.unwrap() {
        Envelope::Result { .. } => {}
        other => panic!("expected rpc:init to succeed, got {other:?}"),
    }
}

#[tokio::test]
async fn user_scoped_subscription_requires_matching_user_id() {
    let hub = Hub::new(HubConfig::default(), None);
    hub.add_event("inbox", EventOptions { user_scoped: true, ..Default::default() });
    let auth: AuthFn = Arc::new(token_is_user_id);
    hub.set_auth(auth);

    let server = TestServer::spawn(realtime_hub::build_router(AppState::new(hub))).await;

    let mut user_42 = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();
    init(&mut user_42, "42").await;
    let subscribe = Envelope::new_method(
        "rpc:on",
        Some(Value::object([
            ("event".to_owned(), Value::Str("inbox".to_owned())),
            ("channel".to_owned(), Value::Str("42".to_owned())),
        ])),
        false,
    );
    user_42.send(&subscribe).await.unwrap();
    match user_42.recv().await.unwrap() {
        Envelope::Result { .. } => {}
        other => panic!("expected user 42 to subscribe to its own channel, got {other:?}"),
    }

    let mut user_99 = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();
    init(&mut user_99, "99").await;
    let subscribe_other = Envelope::new_method(
        "rpc:on",
        Some(Value::object([
            ("event".to_owned(), Value::Str("inbox".to_owned())),
            ("channel".to_owned(), Value::Str("42".to_owned())),
        ])),
        false,
    );
    user_99.send(&subscribe_other).await.unwrap();
    match user_99.recv().await.unwrap() {
        Envelope::Error { code, .. } => {
            assert_eq!(code.as_deref(), Some("event-forbidden"));
        }
        other => panic!("expected user 99's cross-user subscribe to be rejected, got {other:?}"),
    }
}
