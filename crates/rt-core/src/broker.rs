use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Topic prefix under which event topics are namespaced.
pub const TOPIC_PREFIX: &str = "rt-hub";

pub fn topic_for_event(event: &str) -> String {
    format!("{TOPIC_PREFIX}:{event}")
}

/// The payload carried over the broker for one emitted event. `payload` is the pre-encoded envelope bytes produced once at emit
/// time.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub event: String,
    pub channel: Option<String>,
    pub payload: Vec<u8>,
    pub origin_id: String,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker publish failed: {0}")]
    Publish(String),
    #[error("broker subscribe failed: {0}")]
    Subscribe(String),
}

/// Adapter over an external publish/subscribe broker.
///
/// Loop suppression (dropping messages whose `origin_id` matches the local
/// server) is performed by the caller (the orchestrator), not by the
/// broker implementation, since it needs the orchestrator's own origin id
/// to compare against.
#[async_trait]
pub trait ClusterBroker: Send + Sync {
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<(), BrokerError>;

    /// Subscribe to `topics`, delivering every inbound message (including
    /// ones this same process published) to `sink`. Implementations should
    /// return once the subscription is established, not once it ends.
    async fn subscribe(
        &self,
        topics: &[String],
        sink: mpsc::UnboundedSender<BrokerMessage>,
    ) -> Result<(), BrokerError>;

    /// Whether the broker connection is established.
    fn is_ready(&self) -> bool;
}

/// In-memory broker used as the default/test adapter. Fans messages out to
/// every local subscription matching the topic, including the publisher's
/// own subscription — loop suppression is exercised the same way a real
/// broker would exercise it, just without leaving the process.
#[derive(Default)]
pub struct InProcessBroker {
    subscriptions: Mutex<Vec<(String, mpsc::UnboundedSender<BrokerMessage>)>>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterBroker for InProcessBroker {
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<(), BrokerError> {
        let subs = self.subscriptions.lock().expect("broker lock poisoned");
        for (sub_topic, sink) in subs.iter() {
            if sub_topic == topic {
                // A disconnected sink means that subscriber shut down; not
                // this publish's problem.
                let _ = sink.send(message.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topics: &[String],
        sink: mpsc::UnboundedSender<BrokerMessage>,
    ) -> Result<(), BrokerError> {
        let mut subs = self.subscriptions.lock().expect("broker lock poisoned");
        for topic in topics {
            subs.push((topic.clone(), sink.clone()));
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }
}
