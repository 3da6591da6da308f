//! Scenario 5 (spec §8): a client that stops responding is disconnected
//! shortly after the configured keep-alive interval elapses.

use std::time::Duration;

use realtime_hub::{AppState, Hub, HubConfig};
use rt_test_utils::{EnvelopeWsClient, TestServer};
use wire::Envelope;

#[tokio::test]
async fn an_unresponsive_client_is_disconnected_after_the_keepalive_interval() {
    let hub = Hub::new(
        HubConfig {
            keepalive_interval: Duration::from_millis(10),
            ..Default::default()
        },
        None,
    );
    let server = TestServer::spawn(realtime_hub::build_router(AppState::new(hub.clone()))).await;

    let mut client = EnvelopeWsClient::connect(&server.ws_url("/_ws")).await.unwrap();
    client.send(&Envelope::new_setup("ka-test")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(hub.client("ka-test").is_some_and(|n| !n.is_closed()));

    // The client never sends another frame: the server's keep-alive monitor
    // sends one probe at I, then closes the socket if no inbound frame
    // arrives before the second I elapses. Budget generously past 2*I.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(
        hub.client("ka-test").is_none(),
        "unresponsive client should have been disconnected"
    );
    drop(client);
}
