//! Event ingestor
//!
//! Consumes engine events one at a time, in delivery order, and applies each
//! to the store. Trades are rebroadcast to WebSocket subscribers after they
//! are persisted. A bad message is logged, counted and skipped; it never
//! stops the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use types::errors::DecodeError;
use types::event::{EngineEvent, OrderCancelled, OrderPlaced, TradeExecuted};
use types::ids::{OrderId, TradeId};
use types::order::OrderStatus;
use types::trade::Trade;

use crate::hub::HubHandle;
use crate::shutdown::Shutdown;
use crate::store::{
    CreateOrderParams, CreateTradeParams, Store, StoreError, UpdateOrderStatusParams,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{kind} not persisted: {source}")]
    Store {
        kind: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Failed to encode trade frame: {0}")]
    Frame(#[source] serde_json::Error),
}

/// What a successfully handled event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    OrderCreated(OrderId),
    TradeRecorded(TradeId),
    OrderCancelled(OrderId),
    CancelRejected(OrderId),
}

/// Running totals, shared with the health endpoint.
#[derive(Debug, Default)]
pub struct IngestStats {
    processed: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub processed: u64,
    pub discarded: u64,
    pub failed: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Serialize)]
struct TradeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Trade,
}

/// The frame pushed to subscribers for an executed trade.
pub fn trade_frame(trade: &Trade) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(&TradeFrame {
        kind: "trade",
        data: trade,
    })
    .map(Bytes::from)
}

pub struct EventIngestor {
    store: Arc<dyn Store>,
    hub: HubHandle,
    stats: Arc<IngestStats>,
}

impl EventIngestor {
    pub fn new(store: Arc<dyn Store>, hub: HubHandle) -> Self {
        Self {
            store,
            hub,
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Drain `events` until it ends or shutdown fires. An event being
    /// processed when shutdown fires may be abandoned.
    pub async fn run<S>(self, mut events: S, mut shutdown: Shutdown)
    where
        S: Stream<Item = Bytes> + Unpin,
    {
        info!("Event ingestor started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                next = events.next() => match next {
                    Some(payload) => {
                        tokio::select! {
                            biased;
                            _ = shutdown.wait() => break,
                            _ = self.process(&payload) => {}
                        }
                    }
                    None => {
                        warn!("Event subscription closed");
                        break;
                    }
                },
            }
        }

        let totals = self.stats.snapshot();
        info!(
            processed = totals.processed,
            discarded = totals.discarded,
            failed = totals.failed,
            "Event ingestor stopped"
        );
    }

    /// Handle one raw envelope, logging and counting the outcome.
    pub async fn process(&self, payload: &[u8]) -> Option<Ingested> {
        match self.ingest(payload).await {
            Ok(outcome) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                debug!(?outcome, "Event applied");
                Some(outcome)
            }
            Err(IngestError::Decode(e)) if e.is_unknown_kind() => {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Discarding event");
                None
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Event dropped");
                None
            }
        }
    }

    async fn ingest(&self, payload: &[u8]) -> Result<Ingested, IngestError> {
        match EngineEvent::decode(payload)? {
            EngineEvent::OrderPlaced(placed) => self.on_order_placed(placed).await,
            EngineEvent::TradeExecuted(executed) => self.on_trade_executed(executed).await,
            EngineEvent::OrderCancelled(cancelled) => self.on_order_cancelled(cancelled).await,
        }
    }

    async fn on_order_placed(&self, placed: OrderPlaced) -> Result<Ingested, IngestError> {
        let params = CreateOrderParams {
            id: placed.order_id,
            user_id: placed.user_id,
            symbol: placed.symbol,
            price: placed.price,
            amount: placed.amount,
            side: placed.side,
        };
        let order = self
            .store
            .create_order(params)
            .await
            .map_err(|source| IngestError::Store {
                kind: "OrderPlaced",
                source,
            })?;

        info!(order_id = %order.id, user_id = %order.user_id, symbol = %order.symbol, "Order recorded");
        Ok(Ingested::OrderCreated(order.id))
    }

    async fn on_trade_executed(&self, executed: TradeExecuted) -> Result<Ingested, IngestError> {
        let trade = executed.trade;
        let frame = trade_frame(&trade).map_err(IngestError::Frame)?;

        let params = CreateTradeParams {
            engine_trade_id: trade.trade_id,
            maker_order_id: trade.maker_order_id(),
            taker_order_id: trade.taker_order_id(),
            price: trade.price.clone(),
            amount: trade.amount.clone(),
        };
        let record = self
            .store
            .create_trade(params)
            .await
            .map_err(|source| IngestError::Store {
                kind: "TradeExecuted",
                source,
            })?;

        self.hub.broadcast(frame);
        info!(
            trade_id = %record.id,
            engine_trade_id = %record.engine_trade_id,
            maker = %record.maker_order_id,
            taker = %record.taker_order_id,
            price = %record.price,
            amount = %record.amount,
            "Trade recorded and broadcast"
        );
        Ok(Ingested::TradeRecorded(record.id))
    }

    async fn on_order_cancelled(&self, cancelled: OrderCancelled) -> Result<Ingested, IngestError> {
        if !cancelled.success {
            warn!(order_id = %cancelled.order_id, "Engine rejected cancel");
            return Ok(Ingested::CancelRejected(cancelled.order_id));
        }

        let params = UpdateOrderStatusParams {
            id: cancelled.order_id,
            status: OrderStatus::Cancelled,
        };
        self.store
            .update_order_status(params)
            .await
            .map_err(|source| IngestError::Store {
                kind: "OrderCancelled",
                source,
            })?;

        info!(order_id = %cancelled.order_id, "Order cancelled");
        Ok(Ingested::OrderCancelled(cancelled.order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Hub, HubConfig};
    use crate::shutdown;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use types::ids::UserId;
    use types::numeric::DecimalText;
    use types::order::{OrderRecord, Side};
    use types::trade::TradeRecord;

    struct UnavailableStore;

    fn unavailable() -> StoreError {
        StoreError::CorruptRow("store unavailable".to_string())
    }

    #[async_trait]
    impl Store for UnavailableStore {
        async fn create_order(&self, _: CreateOrderParams) -> Result<OrderRecord, StoreError> {
            Err(unavailable())
        }

        async fn create_trade(&self, _: CreateTradeParams) -> Result<TradeRecord, StoreError> {
            Err(unavailable())
        }

        async fn update_order_status(
            &self,
            _: UpdateOrderStatusParams,
        ) -> Result<OrderRecord, StoreError> {
            Err(unavailable())
        }

        async fn get_order(&self, _: OrderId) -> Result<Option<OrderRecord>, StoreError> {
            Err(unavailable())
        }

        async fn list_user_trades(
            &self,
            _: UserId,
            _: usize,
        ) -> Result<Vec<TradeRecord>, StoreError> {
            Err(unavailable())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        ingestor: EventIngestor,
        hub: HubHandle,
        _trigger: shutdown::ShutdownTrigger,
    }

    fn fixture() -> Fixture {
        let (hub, hub_loop) = Hub::new(HubConfig::default());
        let (trigger, listener) = shutdown::channel();
        tokio::spawn(hub_loop.run(listener));
        let store = Arc::new(MemoryStore::new());
        let ingestor = EventIngestor::new(store.clone(), hub.clone());
        Fixture {
            store,
            ingestor,
            hub,
            _trigger: trigger,
        }
    }

    const ORDER_PLACED: &[u8] = br#"{"type":"OrderPlaced","data":{"id":42,"user_id":7,"symbol":"BTC/USDT","price":"50000.00000000","amount":"0.50000000","side":"Bid"}}"#;
    const TRADE_EXECUTED: &[u8] = br#"{"type":"TradeExecuted","data":{"trade_id":1,"seller_order_id":10,"buyer_order_id":11,"price":"50000","amount":"0.1"}}"#;

    #[tokio::test]
    async fn test_order_placed_creates_pending_row() {
        let fx = fixture();
        let outcome = fx.ingestor.process(ORDER_PLACED).await;
        assert_eq!(outcome, Some(Ingested::OrderCreated(OrderId::new(42))));

        let order = fx.store.get_order(OrderId::new(42)).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.user_id.get(), 7);
        assert_eq!(order.side, Side::Bid);
        assert_eq!(order.price.as_str(), "50000.00000000");
        assert_eq!(order.amount.as_str(), "0.50000000");
        assert_eq!(fx.store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_trade_persisted_then_broadcast() {
        let fx = fixture();
        let mut sub = fx.hub.register();

        fx.store
            .create_order(CreateOrderParams {
                id: OrderId::new(10),
                user_id: UserId::new(3),
                symbol: "BTC/USDT".to_string(),
                price: DecimalText::parse("50000").unwrap(),
                amount: DecimalText::parse("0.1").unwrap(),
                side: Side::Ask,
            })
            .await
            .unwrap();

        fx.ingestor.process(TRADE_EXECUTED).await.unwrap();

        let trades = fx.store.list_user_trades(UserId::new(3), 10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].engine_trade_id.get(), 1);
        assert_eq!(trades[0].maker_order_id.get(), 10);
        assert_eq!(trades[0].taker_order_id.get(), 11);

        let frame: Value = serde_json::from_slice(&sub.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "trade");
        assert_eq!(frame["data"]["trade_id"], 1);
        assert_eq!(frame["data"]["seller_order_id"], 10);
        assert_eq!(frame["data"]["buyer_order_id"], 11);
        assert_eq!(frame["data"]["price"], "50000");
        assert_eq!(frame["data"]["amount"], "0.1");
    }

    #[tokio::test]
    async fn test_repeated_engine_trade_id_recorded_and_broadcast_each_time() {
        let fx = fixture();
        let mut sub = fx.hub.register();
        let second = br#"{"type":"TradeExecuted","data":{"trade_id":1,"seller_order_id":12,"buyer_order_id":13,"price":"50001","amount":"0.2"}}"#;

        assert_eq!(
            fx.ingestor.process(TRADE_EXECUTED).await,
            Some(Ingested::TradeRecorded(TradeId::new(1)))
        );
        assert_eq!(
            fx.ingestor.process(second).await,
            Some(Ingested::TradeRecorded(TradeId::new(2)))
        );
        assert_eq!(fx.store.trade_count(), 2);

        for price in ["50000", "50001"] {
            let frame: Value = serde_json::from_slice(&sub.recv().await.unwrap()).unwrap();
            assert_eq!(frame["data"]["trade_id"], 1);
            assert_eq!(frame["data"]["price"], price);
        }
        assert_eq!(fx.ingestor.stats().snapshot().failed, 0);
    }

    #[tokio::test]
    async fn test_failed_trade_write_skips_broadcast() {
        let fx = fixture();
        let ingestor = EventIngestor::new(Arc::new(UnavailableStore), fx.hub.clone());
        let mut sub = fx.hub.register();

        assert!(ingestor.process(TRADE_EXECUTED).await.is_none());
        fx.hub.broadcast("marker");
        assert_eq!(sub.recv().await.unwrap(), "marker");
        assert_eq!(ingestor.stats().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_nested_trade_payload_accepted() {
        let fx = fixture();
        let nested = br#"{"type":"TradeExecuted","data":{"trade":{"trade_id":9,"buyer_order_id":3,"seller_order_id":4,"price":"1.5","amount":"2","timestamp":1700000000}}}"#;
        assert_eq!(
            fx.ingestor.process(nested).await,
            Some(Ingested::TradeRecorded(TradeId::new(1)))
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_discarded_without_changes() {
        let fx = fixture();
        let unknown = br#"{"type":"OrderAmended","data":{"order_id":42}}"#;

        assert!(fx.ingestor.process(unknown).await.is_none());
        assert_eq!(fx.store.order_count(), 0);
        assert_eq!(fx.store.trade_count(), 0);
        assert_eq!(
            fx.ingestor.stats().snapshot(),
            IngestSnapshot {
                processed: 0,
                discarded: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_counted_as_failed() {
        let fx = fixture();
        assert!(fx.ingestor.process(b"{not json").await.is_none());
        let bad_price = br#"{"type":"OrderPlaced","data":{"id":1,"user_id":1,"symbol":"BTC/USDT","price":"abc","amount":"1","side":"Bid"}}"#;
        assert!(fx.ingestor.process(bad_price).await.is_none());

        assert_eq!(fx.ingestor.stats().snapshot().failed, 2);
        assert_eq!(fx.store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_success_and_rejection() {
        let fx = fixture();
        fx.ingestor.process(ORDER_PLACED).await.unwrap();

        let rejected = br#"{"type":"OrderCancelled","data":{"order_id":42,"success":false}}"#;
        assert_eq!(
            fx.ingestor.process(rejected).await,
            Some(Ingested::CancelRejected(OrderId::new(42)))
        );
        let order = fx.store.get_order(OrderId::new(42)).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        let accepted = br#"{"type":"OrderCancelled","data":{"order_id":42,"success":true}}"#;
        assert_eq!(
            fx.ingestor.process(accepted).await,
            Some(Ingested::OrderCancelled(OrderId::new(42)))
        );
        let order = fx.store.get_order(OrderId::new(42)).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        // already terminal
        assert!(fx.ingestor.process(accepted).await.is_none());
    }

    #[tokio::test]
    async fn test_run_processes_in_order_and_survives_bad_messages() {
        let fx = fixture();
        let (_trigger, listener) = shutdown::channel();
        let stats = fx.ingestor.stats();

        let events = vec![
            Bytes::from_static(b"garbage"),
            Bytes::from_static(ORDER_PLACED),
            Bytes::from_static(br#"{"type":"Heartbeat","data":{}}"#),
            Bytes::from_static(br#"{"type":"OrderCancelled","data":{"order_id":42,"success":true}}"#),
        ];
        fx.ingestor.run(futures::stream::iter(events), listener).await;

        let order = fx.store.get_order(OrderId::new(42)).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(
            stats.snapshot(),
            IngestSnapshot {
                processed: 2,
                discarded: 1,
                failed: 1
            }
        );
    }
}
