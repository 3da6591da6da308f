//! rt-test-utils: shared test harness for the real-time hub's integration
//! suites.
//!
//! Provides a thin WebSocket client that speaks the hub's envelope protocol
//! and a helper to spawn a real axum router on a loopback listener, so
//! integration tests exercise the actual server rather than a protocol-level
//! stand-in.

pub mod envelope_ws_client;
pub mod test_server;

pub use envelope_ws_client::EnvelopeWsClient;
pub use test_server::TestServer;
