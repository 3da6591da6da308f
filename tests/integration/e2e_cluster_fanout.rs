//! Scenario 4 (spec §8): two server instances sharing a broker. A client on
//! each subscribes to a cluster-flagged event; one instance emits and both
//! clients observe exactly one event envelope, with no double delivery to
//! the emitting instance's own subscriber.

use std::sync::Arc;
use std::time::Duration;

use realtime_hub::{AppState, Hub, HubConfig, Value};
use rt_core::{ClusterBroker, InProcessBroker};
use rt_test_utils::{EnvelopeWsClient, TestServer};
use wire::Envelope;

async fn subscribe_to_tick(client: &mut EnvelopeWsClient) {
    let call = Envelope::new_method(
        "rpc:on",
        Some(Value::object([("event".to_owned(), Value::Str("tick".to_owned()))])),
        false,
    );
    client.send(&call).await.unwrap();
    match client.recv().await.unwrap() {
        Envelope::Result { .. } => {}
        other => panic!("expected rpc:on to succeed, got {other:?}"),
    }
}

#[tokio::test]
async fn cluster_emit_reaches_both_instances_exactly_once() {
    let broker = Arc::new(InProcessBroker::new());

    let hub_a = Hub::new(HubConfig::default(), Some(broker.clone() as Arc<dyn ClusterBroker>));
    hub_a.add_event("tick", rt_core::EventOptions { cluster: true, ..Default::default() });
    hub_a.start_cluster_subscription().await;

    let hub_b = Hub::new(HubConfig::default(), Some(broker as Arc<dyn ClusterBroker>));
    hub_b.add_event("tick", rt_core::EventOptions { cluster: true, ..Default::default() });
    hub_b.start_cluster_subscription().await;

    let server_a = TestServer::spawn(realtime_hub::build_router(AppState::new(hub_a.clone()))).await;
    let server_b = TestServer::spawn(realtime_hub::build_router(AppState::new(hub_b))).await;

    let mut client_a = EnvelopeWsClient::connect(&server_a.ws_url("/_ws")).await.unwrap();
    let mut client_b = EnvelopeWsClient::connect(&server_b.ws_url("/_ws")).await.unwrap();
    subscribe_to_tick(&mut client_a).await;
    subscribe_to_tick(&mut client_b).await;

    hub_a.emit("tick", None, Some(Value::Int(42))).await;

    for client in [&mut client_a, &mut client_b] {
        match client.recv().await.unwrap() {
            Envelope::Event { event, params, .. } => {
                assert_eq!(event, "tick");
                assert_eq!(params, Some(Value::Int(42)));
            }
            other => panic!("expected a tick event, got {other:?}"),
        }
    }

    // Neither client should observe a second copy within a short window.
    assert!(tokio::time::timeout(Duration::from_millis(100), client_a.recv()).await.is_err());
    assert!(tokio::time::timeout(Duration::from_millis(100), client_b.recv()).await.is_err());
}
