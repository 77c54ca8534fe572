//! Persistence surface consumed by the real-time core
//!
//! The ingestor only writes through [`Store`]; REST reads use the same trait.
//! Prices and amounts travel as [`DecimalText`] in both directions so the
//! stored text is exactly the text the engine sent.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use types::ids::{OrderId, TradeId, UserId};
use types::numeric::DecimalText;
use types::order::{OrderRecord, OrderStatus, Side};
use types::trade::TradeRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderParams {
    pub id: OrderId,
    pub user_id: UserId,
    pub symbol: String,
    pub price: DecimalText,
    pub amount: DecimalText,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTradeParams {
    pub engine_trade_id: TradeId,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub price: DecimalText,
    pub amount: DecimalText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOrderStatusParams {
    pub id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: u64 },

    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Order {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Id {0} does not fit the storage column")]
    IdOutOfRange(u64),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Row-level operations the core needs. Implementations must be safe for
/// concurrent use by the ingestor and by request handlers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new order with status `pending`.
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, StoreError>;

    /// Insert a new immutable trade row. The row id is assigned by the store;
    /// `engine_trade_id` may repeat across rows.
    async fn create_trade(&self, params: CreateTradeParams) -> Result<TradeRecord, StoreError>;

    /// Move an order to `params.status` if the transition is allowed.
    async fn update_order_status(
        &self,
        params: UpdateOrderStatusParams,
    ) -> Result<OrderRecord, StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError>;

    /// Trades where the user owns the maker or the taker order, most recent
    /// first.
    async fn list_user_trades(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<TradeRecord>, StoreError>;
}
