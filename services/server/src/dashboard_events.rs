//! Operational events for the dashboard SSE stream. Purely observational —
//! distinct from the client-facing wire [`wire::Envelope`] protocol.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    ClientConnected {
        client_id: String,
        remote_addr: String,
    },
    ClientDisconnected {
        client_id: String,
    },
    KeepAliveTimedOut {
        client_id: String,
    },
    LogEntry {
        entry: String,
    },
}
