//! Duplicate identity handling (spec §3 invariant, §9 "Duplicate identity
//! handling"): reassigning a connection's identity to one already held by
//! another connected node closes the prior node.

use realtime_hub::{AppState, Hub, HubConfig};
use rt_test_utils::{EnvelopeWsClient, TestServer};
use wire::Envelope;

#[tokio::test]
async fn reconnecting_with_the_same_identity_closes_the_prior_node() {
    let hub = Hub::new(HubConfig::default(), None);
    let server = TestServer::spawn(realtime_hub::build_router(AppState::new(hub.clone()))).await;

    let mut first = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();
    first.send(&Envelope::new_setup("dup")).await.unwrap();

    // Give the server a moment to process the setup frame before asserting
    // on hub state from this test's own task.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let stale_node = hub.client("dup").expect("dup identity should be registered");
    assert!(!stale_node.is_closed());

    let mut second = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();
    second.send(&Envelope::new_setup("dup")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(stale_node.is_closed(), "reassigning `dup` to the new connection must close the old node");

    let current = hub.client("dup").expect("dup identity should still be registered");
    assert!(!current.is_closed(), "the reconnected node should remain open");
    assert!(!std::sync::Arc::ptr_eq(&stale_node, &current), "the new connection must be a distinct node");
}
