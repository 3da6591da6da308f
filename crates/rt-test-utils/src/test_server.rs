//! Spawns a real axum router on a loopback listener for integration tests,
//! so suites drive a real `axum::serve` instance instead of a
//! protocol-level mock.

use std::net::SocketAddr;

use axum::Router;

pub struct TestServer {
    pub addr: SocketAddr,
    _task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Bind to a random loopback port and serve `router` in a background
    /// task for the lifetime of this handle.
    pub async fn spawn(router: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("test server error");
        });
        Self { addr, _task: task }
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}
