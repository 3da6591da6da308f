pub mod auth;
pub mod dashboard_events;
pub mod dashboard_sse;
pub mod http_call;
pub mod sse;
pub mod state;
pub mod ws;
pub mod ws_common;

pub use state::AppState;

use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Assemble the router: duplex (`/_ws`), one-way push (`/_push`), and
/// one-envelope-per-call (`/_call`) client transports, plus an operational
/// dashboard feed and health probes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/_ws", get(ws::ws_handler))
        .route("/_push", get(sse::push_handler))
        .route("/_call", post(http_call::call_handler))
        .route("/api/v1/events", get(dashboard_sse::dashboard_sse_handler))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}

mod health {
    use axum::extract::State;
    use axum::response::IntoResponse;

    use crate::state::AppState;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }

    /// Ready only once the hub still accepts connections and, if a cluster
    /// broker is configured, it has connected.
    pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
        if state.hub.accepts_connections() && state.hub.broker_ready() {
            (axum::http::StatusCode::OK, "ok")
        } else {
            (axum::http::StatusCode::SERVICE_UNAVAILABLE, "not ready")
        }
    }
}
