//! Message bus adapters
//!
//! Commands go out through the [`CommandBus`] trait so the publisher can be
//! exercised without a broker. [`NatsBus`] is the production implementation
//! and also opens the event subscription consumed by the ingestor.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("Publish to {subject} failed: {reason}")]
    Publish { subject: String, reason: String },

    #[error("Subscribe to {subject} failed: {reason}")]
    Subscribe { subject: String, reason: String },
}

/// Outbound half of the bus: fire-and-forget publishing.
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Publish `payload` on `subject`. An `Ok` only means the bus took the
    /// message, never that a consumer acted on it.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError>;
}

/// NATS-backed bus
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!(url, "NATS connected");
        Ok(Self { client })
    }

    /// Subscribe to `subject`, yielding raw message payloads in delivery order.
    pub async fn subscribe(&self, subject: &str) -> Result<BoxStream<'static, Bytes>, BusError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;
        info!(subject, "Subscribed to bus subject");
        Ok(subscriber.map(|message| message.payload).boxed())
    }
}

#[async_trait]
impl CommandBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        let fail = |reason: String| BusError::Publish {
            subject: subject.to_string(),
            reason,
        };

        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| fail(e.to_string()))?;

        // publish only buffers client-side; flushing surfaces a dead connection now
        self.client.flush().await.map_err(|e| fail(e.to_string()))
    }
}
