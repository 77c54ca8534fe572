//! PostgreSQL store
//!
//! Decimals are bound as text and cast to `numeric` in SQL, and selected back
//! with `::text`, so no value ever passes through a binary float.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::info;
use types::ids::{OrderId, TradeId, UserId};
use types::numeric::DecimalText;
use types::order::{OrderRecord, OrderStatus};
use types::trade::TradeRecord;

use super::{CreateOrderParams, CreateTradeParams, Store, StoreError, UpdateOrderStatusParams};

const ORDER_COLUMNS: &str = "id, user_id, symbol, price::text AS price, amount::text AS amount, \
                             side, status, created_at";
const TRADE_COLUMNS: &str = "id, engine_trade_id, maker_order_id, taker_order_id, \
                             price::text AS price, amount::text AS amount, created_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a pool and apply pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(max_connections, "Database pool ready");
        Ok(Self { pool })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    symbol: String,
    price: String,
    amount: String,
    side: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(OrderRecord {
            id: OrderId::new(from_column(row.id)?),
            user_id: UserId::new(from_column(row.user_id)?),
            symbol: row.symbol,
            price: decimal_column(row.price)?,
            amount: decimal_column(row.amount)?,
            side: row.side.parse().map_err(StoreError::CorruptRow)?,
            status: row.status.parse().map_err(StoreError::CorruptRow)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TradeRow {
    id: i64,
    engine_trade_id: i64,
    maker_order_id: i64,
    taker_order_id: i64,
    price: String,
    amount: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = StoreError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        Ok(TradeRecord {
            id: TradeId::new(from_column(row.id)?),
            engine_trade_id: TradeId::new(from_column(row.engine_trade_id)?),
            maker_order_id: OrderId::new(from_column(row.maker_order_id)?),
            taker_order_id: OrderId::new(from_column(row.taker_order_id)?),
            price: decimal_column(row.price)?,
            amount: decimal_column(row.amount)?,
            created_at: row.created_at,
        })
    }
}

fn to_column(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::IdOutOfRange(id))
}

fn from_column(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::CorruptRow(format!("negative id {value}")))
}

fn decimal_column(text: String) -> Result<DecimalText, StoreError> {
    DecimalText::parse(text).map_err(|e| StoreError::CorruptRow(e.to_string()))
}

fn duplicate_or(entity: &'static str, id: u64) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate { entity, id }
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, StoreError> {
        let sql = format!(
            "INSERT INTO orders (id, user_id, symbol, price, amount, side, status) \
             VALUES ($1, $2, $3, $4::numeric, $5::numeric, $6, $7) \
             RETURNING {ORDER_COLUMNS}"
        );
        let row: OrderRow = sqlx::query_as(&sql)
            .bind(to_column(params.id.get())?)
            .bind(to_column(params.user_id.get())?)
            .bind(&params.symbol)
            .bind(params.price.as_str())
            .bind(params.amount.as_str())
            .bind(params.side.as_str())
            .bind(OrderStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(duplicate_or("Order", params.id.get()))?;
        row.try_into()
    }

    async fn create_trade(&self, params: CreateTradeParams) -> Result<TradeRecord, StoreError> {
        let sql = format!(
            "INSERT INTO trades (engine_trade_id, maker_order_id, taker_order_id, price, amount) \
             VALUES ($1, $2, $3, $4::numeric, $5::numeric) \
             RETURNING {TRADE_COLUMNS}"
        );
        let row: TradeRow = sqlx::query_as(&sql)
            .bind(to_column(params.engine_trade_id.get())?)
            .bind(to_column(params.maker_order_id.get())?)
            .bind(to_column(params.taker_order_id.get())?)
            .bind(params.price.as_str())
            .bind(params.amount.as_str())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn update_order_status(
        &self,
        params: UpdateOrderStatusParams,
    ) -> Result<OrderRecord, StoreError> {
        let allowed_from: Vec<String> = params
            .status
            .predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        // only rows currently in an allowed predecessor status are touched
        let sql = format!(
            "UPDATE orders SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status = ANY($3::text[]) \
             RETURNING {ORDER_COLUMNS}"
        );
        let updated: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(to_column(params.id.get())?)
            .bind(params.status.as_str())
            .bind(allowed_from)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => row.try_into(),
            None => match self.get_order(params.id).await? {
                Some(current) => Err(StoreError::InvalidTransition {
                    id: params.id,
                    from: current.status,
                    to: params.status,
                }),
                None => Err(StoreError::OrderNotFound(params.id)),
            },
        }
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(to_column(id.get())?)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OrderRecord::try_from).transpose()
    }

    async fn list_user_trades(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<TradeRecord>, StoreError> {
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trades t \
             WHERE EXISTS ( \
                 SELECT 1 FROM orders o \
                 WHERE o.user_id = $1 AND o.id IN (t.maker_order_id, t.taker_order_id) \
             ) \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<TradeRow> = sqlx::query_as(&sql)
            .bind(to_column(user_id.get())?)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TradeRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_columns_reject_out_of_range() {
        assert_eq!(to_column(42).unwrap(), 42);
        assert!(matches!(to_column(u64::MAX), Err(StoreError::IdOutOfRange(_))));
        assert!(matches!(from_column(-1), Err(StoreError::CorruptRow(_))));
    }

    #[test]
    fn test_order_row_conversion_keeps_text() {
        let row = OrderRow {
            id: 9,
            user_id: 3,
            symbol: "ETH/USDT".to_string(),
            price: "3000.12345678".to_string(),
            amount: "2.5".to_string(),
            side: "Ask".to_string(),
            status: "open".to_string(),
            created_at: Utc::now(),
        };
        let record = OrderRecord::try_from(row).unwrap();
        assert_eq!(record.price.as_str(), "3000.12345678");
        assert_eq!(record.amount.as_str(), "2.5");
        assert_eq!(record.status, OrderStatus::Open);
    }

    #[test]
    fn test_trade_row_keeps_engine_trade_id() {
        let row = TradeRow {
            id: 12,
            engine_trade_id: 1,
            maker_order_id: 10,
            taker_order_id: 11,
            price: "50000.5".to_string(),
            amount: "0.1".to_string(),
            created_at: Utc::now(),
        };
        let record = TradeRecord::try_from(row).unwrap();
        assert_eq!(record.id, TradeId::new(12));
        assert_eq!(record.engine_trade_id, TradeId::new(1));
        assert_eq!(record.price.as_str(), "50000.5");
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let row = OrderRow {
            id: 1,
            user_id: 1,
            symbol: "BTC/USDT".to_string(),
            price: "1".to_string(),
            amount: "1".to_string(),
            side: "Bid".to_string(),
            status: "exploded".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(OrderRecord::try_from(row), Err(StoreError::CorruptRow(_))));
    }
}
