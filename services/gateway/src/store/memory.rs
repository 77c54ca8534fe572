//! In-process store used when no database is configured, and by tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use types::ids::{OrderId, TradeId, UserId};
use types::order::{OrderRecord, OrderStatus};
use types::trade::TradeRecord;

use super::{CreateOrderParams, CreateTradeParams, Store, StoreError, UpdateOrderStatusParams};

#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: DashMap<OrderId, OrderRecord>,
    trades: DashMap<TradeId, TradeRecord>,
    last_trade_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, StoreError> {
        match self.orders.entry(params.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                entity: "Order",
                id: params.id.get(),
            }),
            Entry::Vacant(slot) => {
                let record = OrderRecord {
                    id: params.id,
                    user_id: params.user_id,
                    symbol: params.symbol,
                    price: params.price,
                    amount: params.amount,
                    side: params.side,
                    status: OrderStatus::Pending,
                    created_at: Utc::now(),
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn create_trade(&self, params: CreateTradeParams) -> Result<TradeRecord, StoreError> {
        let id = TradeId::new(self.last_trade_id.fetch_add(1, Ordering::Relaxed) + 1);
        let record = TradeRecord {
            id,
            engine_trade_id: params.engine_trade_id,
            maker_order_id: params.maker_order_id,
            taker_order_id: params.taker_order_id,
            price: params.price,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.trades.insert(id, record.clone());
        Ok(record)
    }

    async fn update_order_status(
        &self,
        params: UpdateOrderStatusParams,
    ) -> Result<OrderRecord, StoreError> {
        let mut order = self
            .orders
            .get_mut(&params.id)
            .ok_or(StoreError::OrderNotFound(params.id))?;

        let from = order.status;
        order
            .transition(params.status)
            .map_err(|_| StoreError::InvalidTransition {
                id: params.id,
                from,
                to: params.status,
            })?;
        Ok(order.clone())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.orders.get(&id).map(|order| order.clone()))
    }

    async fn list_user_trades(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<TradeRecord>, StoreError> {
        let owned = |id: &OrderId| {
            self.orders
                .get(id)
                .is_some_and(|order| order.user_id == user_id)
        };
        let mut trades: Vec<TradeRecord> = self
            .trades
            .iter()
            .filter(|t| owned(&t.maker_order_id) || owned(&t.taker_order_id))
            .map(|t| t.value().clone())
            .collect();
        trades.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        trades.truncate(limit);
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::DecimalText;
    use types::order::Side;

    fn order_params(id: u64) -> CreateOrderParams {
        owned_by(id, 7)
    }

    fn owned_by(id: u64, user_id: u64) -> CreateOrderParams {
        CreateOrderParams {
            id: OrderId::new(id),
            user_id: UserId::new(user_id),
            symbol: "BTC/USDT".to_string(),
            price: DecimalText::parse("50000.00000000").unwrap(),
            amount: DecimalText::parse("0.50000000").unwrap(),
            side: Side::Bid,
        }
    }

    fn trade_params(engine_trade_id: u64, maker: u64, taker: u64) -> CreateTradeParams {
        CreateTradeParams {
            engine_trade_id: TradeId::new(engine_trade_id),
            maker_order_id: OrderId::new(maker),
            taker_order_id: OrderId::new(taker),
            price: DecimalText::parse("50000").unwrap(),
            amount: DecimalText::parse("0.1").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_order_starts_pending_with_exact_text() {
        let store = MemoryStore::new();
        let order = store.create_order(order_params(42)).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.price.as_str(), "50000.00000000");
        assert_eq!(order.amount.as_str(), "0.50000000");
        assert_eq!(store.get_order(OrderId::new(42)).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_duplicate_order_rejected() {
        let store = MemoryStore::new();
        store.create_order(order_params(1)).await.unwrap();
        let err = store.create_order(order_params(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "Order", id: 1 }));
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_transition() {
        let store = MemoryStore::new();
        store.create_order(order_params(5)).await.unwrap();

        let cancel = UpdateOrderStatusParams {
            id: OrderId::new(5),
            status: OrderStatus::Cancelled,
        };
        let updated = store.update_order_status(cancel).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Cancelled);

        let again = store.update_order_status(cancel).await.unwrap_err();
        assert!(matches!(
            again,
            StoreError::InvalidTransition {
                from: OrderStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_missing_order() {
        let store = MemoryStore::new();
        let err = store
            .update_order_status(UpdateOrderStatusParams {
                id: OrderId::new(404),
                status: OrderStatus::Cancelled,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_repeated_engine_trade_id_gets_new_row() {
        let store = MemoryStore::new();
        let first = store.create_trade(trade_params(1, 10, 11)).await.unwrap();
        let second = store.create_trade(trade_params(1, 10, 12)).await.unwrap();

        assert_eq!(first.id, TradeId::new(1));
        assert_eq!(second.id, TradeId::new(2));
        assert_eq!(first.engine_trade_id, second.engine_trade_id);
        assert_eq!(store.trade_count(), 2);
    }

    #[tokio::test]
    async fn test_list_user_trades_filters_and_limits() {
        let store = MemoryStore::new();
        store.create_order(owned_by(10, 1)).await.unwrap();
        store.create_order(owned_by(11, 2)).await.unwrap();
        store.create_order(owned_by(20, 3)).await.unwrap();

        for _ in 0..4 {
            store.create_trade(trade_params(1, 10, 11)).await.unwrap();
        }
        store.create_trade(trade_params(1, 20, 21)).await.unwrap();

        let maker_side = store.list_user_trades(UserId::new(1), 3).await.unwrap();
        assert_eq!(maker_side.len(), 3);
        assert!(maker_side.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let taker_side = store.list_user_trades(UserId::new(2), 10).await.unwrap();
        assert_eq!(taker_side.len(), 4);

        let other = store.list_user_trades(UserId::new(3), 10).await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].maker_order_id, OrderId::new(20));

        assert!(store.list_user_trades(UserId::new(9), 10).await.unwrap().is_empty());
    }
}
