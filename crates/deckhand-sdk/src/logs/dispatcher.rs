//! Publishes log chunks to per-deployment topics.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use super::aggregator::Chunk;
use crate::error::SdkResult;

/// Topic carrying a deployment's log messages.
pub fn deployment_topic(deployment_id: &str) -> String {
    format!("deployment:{deployment_id}:logs")
}

/// Message sent for every dispatched chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub deployment_id: String,
    pub lines: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Pub/sub transport.
#[async_trait]
pub trait LogPublisher: Send + Sync {
    async fn publish(&self, topic: &str, message: LogMessage) -> SdkResult<()>;
}

/// In-process transport with one broadcast channel per topic.
///
/// Messages published to a topic nobody subscribed to are dropped.
pub struct BroadcastPublisher {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<LogMessage>>>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Receive every message published to `topic` from now on
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<LogMessage> {
        let mut channels = self.channels.write().await;
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .read()
            .await
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl LogPublisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, message: LogMessage) -> SdkResult<()> {
        let channels = self.channels.read().await;
        let delivered = channels
            .get(topic)
            .is_some_and(|sender| sender.send(message).is_ok());
        if !delivered {
            debug!(topic = %topic, "No subscribers, dropping log message");
        }
        Ok(())
    }
}

/// Turns chunks into messages for one deployment's topic.
#[derive(Clone)]
pub struct Dispatcher {
    deployment_id: String,
    topic: String,
    publisher: Arc<dyn LogPublisher>,
}

impl Dispatcher {
    pub fn new(deployment_id: impl Into<String>, publisher: Arc<dyn LogPublisher>) -> Self {
        let deployment_id = deployment_id.into();
        Self {
            topic: deployment_topic(&deployment_id),
            deployment_id,
            publisher,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a chunk. Transport errors are logged, never returned.
    pub async fn dispatch(&self, chunk: Chunk) -> bool {
        let line_count = chunk.lines.len();
        let message = LogMessage {
            deployment_id: self.deployment_id.clone(),
            lines: chunk.lines,
            timestamp: chunk.created_at,
        };
        match self.publisher.publish(&self.topic, message).await {
            Ok(()) => {
                debug!(topic = %self.topic, lines = line_count, "Dispatched log chunk");
                true
            }
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "Failed to publish log chunk");
                false
            }
        }
    }
}
