use std::sync::Arc;

use rt_core::Hub;
use tokio::sync::broadcast;

use crate::dashboard_events::DashboardEvent;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub dashboard_tx: broadcast::Sender<DashboardEvent>,
    pub logger: Arc<rt_ui_log::UiLogger<DashboardEvent>>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        let (dashboard_tx, _) = broadcast::channel(4096);
        let logger = Arc::new(rt_ui_log::UiLogger::with_buffer(
            dashboard_tx.clone(),
            |entry| DashboardEvent::LogEntry { entry },
            500,
        ));
        Self {
            hub,
            dashboard_tx,
            logger,
        }
    }

    pub fn dashboard_event(&self, event: DashboardEvent) {
        let _ = self.dashboard_tx.send(event);
    }
}
