use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use rt_broker_redis::RedisBroker;
use rt_core::{ClusterBroker, Hub, HubConfig, InProcessBroker};
use server::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());

    let broker: Arc<dyn ClusterBroker> = match env::var("REDIS_URL") {
        Ok(url) => {
            info!(%url, "connecting to cluster broker");
            Arc::new(RedisBroker::new(&url).expect("failed to construct redis broker"))
        }
        Err(_) => {
            info!("no REDIS_URL set, running with an in-process broker");
            Arc::new(InProcessBroker::new())
        }
    };

    let hub = Hub::new(HubConfig::default(), Some(broker));
    hub.start_cluster_subscription().await;

    let state = AppState::new(hub.clone());
    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "server listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(hub))
    .await
    .expect("server error");
    info!("server shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT), closes the hub, and returns to
/// trigger graceful shutdown.
async fn shutdown_signal(hub: Arc<Hub>) {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }

    hub.close().await;
}
