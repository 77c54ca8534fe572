//! Market data relay
//!
//! Forwards order book updates published on a Redis channel to every hub
//! subscriber, byte for byte. One relay runs per configured symbol.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MarketDataConfig;
use crate::hub::HubHandle;
use crate::shutdown::Shutdown;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Channel name carrying updates for `symbol`, e.g. `ob_update:BTC/USDT`.
pub fn channel_for(prefix: &str, symbol: &str) -> String {
    format!("{prefix}:{symbol}")
}

pub struct MarketDataRelay {
    hub: HubHandle,
    channel: String,
}

impl MarketDataRelay {
    pub fn new(hub: HubHandle, channel: impl Into<String>) -> Self {
        Self {
            hub,
            channel: channel.into(),
        }
    }

    /// Relay every message of `feed` until it ends or shutdown fires.
    /// Returns the number of messages forwarded.
    pub async fn run<S>(self, mut feed: S, mut shutdown: Shutdown) -> u64
    where
        S: Stream<Item = Bytes> + Unpin,
    {
        let mut forwarded = 0u64;
        info!(channel = %self.channel, "Market data relay started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                message = feed.next() => match message {
                    Some(payload) => {
                        debug!(channel = %self.channel, bytes = payload.len(), "Relaying update");
                        self.hub.broadcast(payload);
                        forwarded += 1;
                    }
                    None => {
                        warn!(channel = %self.channel, "Market data feed ended");
                        break;
                    }
                },
            }
        }

        info!(channel = %self.channel, forwarded, "Market data relay stopped");
        forwarded
    }
}

/// Subscribe to one Redis pub/sub channel, yielding raw payloads.
pub async fn subscribe_redis(
    client: &redis::Client,
    channel: &str,
) -> Result<BoxStream<'static, Bytes>, RelayError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    Ok(pubsub
        .into_on_message()
        .map(|msg| Bytes::copy_from_slice(msg.get_payload_bytes()))
        .boxed())
}

/// Start one relay task per configured symbol.
///
/// A symbol whose subscription fails is logged and skipped; the others still
/// start.
pub async fn spawn_redis_relays(
    config: &MarketDataConfig,
    hub: &HubHandle,
    shutdown: &Shutdown,
) -> Result<Vec<JoinHandle<u64>>, RelayError> {
    let client = redis::Client::open(config.redis_url.as_str())?;
    let mut tasks = Vec::with_capacity(config.symbols.len());

    for symbol in &config.symbols {
        let channel = channel_for(&config.channel_prefix, symbol);
        match subscribe_redis(&client, &channel).await {
            Ok(feed) => {
                let relay = MarketDataRelay::new(hub.clone(), channel);
                tasks.push(tokio::spawn(relay.run(feed, shutdown.clone())));
            }
            Err(e) => {
                error!(channel = %channel, error = %e, "Market data subscription failed, skipping symbol");
            }
        }
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Hub, HubConfig};
    use crate::shutdown;

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_for("ob_update", "BTC/USDT"), "ob_update:BTC/USDT");
    }

    #[tokio::test]
    async fn test_payloads_forwarded_verbatim_in_order() {
        let (hub, hub_loop) = Hub::new(HubConfig::default());
        let (_trigger, listener) = shutdown::channel();
        tokio::spawn(hub_loop.run(listener.clone()));
        let mut sub = hub.register();

        let updates = vec![
            Bytes::from_static(br#"{"bids":[["50000","1"]],"asks":[]}"#),
            Bytes::from_static(b"not json at all \xff"),
            Bytes::from_static(br#"{"bids":[],"asks":[["50001","2"]]}"#),
        ];
        let relay = MarketDataRelay::new(hub.clone(), "ob_update:BTC/USDT");
        let forwarded = relay
            .run(futures::stream::iter(updates.clone()), listener)
            .await;

        assert_eq!(forwarded, 3);
        for expected in updates {
            assert_eq!(sub.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_relay_stops_on_shutdown() {
        let (hub, _hub_loop) = Hub::new(HubConfig::default());
        let (trigger, listener) = shutdown::channel();
        trigger.trigger();

        let relay = MarketDataRelay::new(hub, "ob_update:ETH/USDT");
        let forwarded = relay.run(futures::stream::pending::<Bytes>(), listener).await;
        assert_eq!(forwarded, 0);
    }
}
