//! Cluster broker adapter backed by Redis pub/sub.
//!
//! Fans events across server instances sharing a Redis deployment. Wire
//! format on the Redis channel is a small JSON envelope carrying the
//! already-encoded application payload as base64, so the broker itself
//! never has to understand the application's own wire codec.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use futures_util::StreamExt;
use redis::AsyncCommands;
use rt_core::{BrokerError, BrokerMessage, ClusterBroker};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Serialize, Deserialize)]
struct WireMessage {
    event: String,
    channel: Option<String>,
    payload: String,
    origin_id: String,
}

impl From<&BrokerMessage> for WireMessage {
    fn from(message: &BrokerMessage) -> Self {
        WireMessage {
            event: message.event.clone(),
            channel: message.channel.clone(),
            payload: base64::engine::general_purpose::STANDARD.encode(&message.payload),
            origin_id: message.origin_id.clone(),
        }
    }
}

impl TryFrom<WireMessage> for BrokerMessage {
    type Error = String;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let payload = base64::engine::general_purpose::STANDARD
            .decode(wire.payload)
            .map_err(|e| e.to_string())?;
        Ok(BrokerMessage {
            event: wire.event,
            channel: wire.channel,
            payload,
            origin_id: wire.origin_id,
        })
    }
}

/// Redis-backed [`ClusterBroker`]. Connects lazily; `publish` opens a
/// multiplexed connection on first use and reuses it afterward, `subscribe`
/// spawns a background task that owns its own pubsub connection for the
/// life of the process.
pub struct RedisBroker {
    client: redis::Client,
    ready: Arc<AtomicBool>,
}

impl RedisBroker {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            ready: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl ClusterBroker for RedisBroker {
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<(), BrokerError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        let payload = serde_json::to_vec(&WireMessage::from(&message))
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        conn.publish::<_, _, ()>(topic, payload)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        topics: &[String],
        sink: mpsc::UnboundedSender<BrokerMessage>,
    ) -> Result<(), BrokerError> {
        let client = self.client.clone();
        let topics = topics.to_vec();
        let ready = self.ready.clone();

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;
        for topic in &topics {
            pubsub
                .subscribe(topic)
                .await
                .map_err(|e| BrokerError::Subscribe(e.to_string()))?;
        }
        ready.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let raw: Vec<u8> = match msg.get_payload() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(error = %err, "dropped malformed redis pubsub payload");
                        continue;
                    }
                };
                let wire: WireMessage = match serde_json::from_slice(&raw) {
                    Ok(wire) => wire,
                    Err(err) => {
                        tracing::warn!(error = %err, "dropped undecodable broker message");
                        continue;
                    }
                };
                match BrokerMessage::try_from(wire) {
                    Ok(message) => {
                        if sink.send(message).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "dropped broker message with invalid payload encoding"),
                }
            }
        });

        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
