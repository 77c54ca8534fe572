//! Command publisher
//!
//! Turns a validated order intent into a `Place` command and publishes it on
//! the command subject. Nothing reaches the bus unless validation passed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};
use types::command::{CancelOrder, Command, PlaceOrder};
use types::errors::OrderError;
use types::ids::{OrderId, UserId};
use types::numeric::DecimalText;
use types::order::{OrderType, Side};

use crate::bus::{BusError, CommandBus};

/// Hands out order ids from the nanosecond wall clock, bumping to `last + 1`
/// whenever the clock has not advanced past the previous id.
#[derive(Debug, Default)]
pub struct OrderIdAllocator {
    last: AtomicU64,
}

impl OrderIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> OrderId {
        self.allocate(now_nanos())
    }

    fn allocate(&self, now: u64) -> OrderId {
        let mut issued = now;
        // fetch_update only fails when the closure returns None
        let _ = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                issued = now.max(last.saturating_add(1));
                Some(issued)
            });
        OrderId::new(issued)
    }
}

fn now_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or_default()
}

/// A user's request to place an order, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceIntent {
    pub user_id: UserId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub trigger_price: Option<Decimal>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Invalid(#[from] OrderError),

    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Bus(#[from] BusError),
}

pub struct CommandPublisher {
    bus: Arc<dyn CommandBus>,
    subject: String,
    ids: OrderIdAllocator,
}

impl CommandPublisher {
    pub fn new(bus: Arc<dyn CommandBus>, subject: impl Into<String>) -> Self {
        Self {
            bus,
            subject: subject.into(),
            ids: OrderIdAllocator::new(),
        }
    }

    /// Validate, stamp and publish a `Place` command. Returns the id the
    /// engine will report back in its events.
    pub async fn place(&self, intent: PlaceIntent) -> Result<OrderId, PublishError> {
        let command = self.build_place(intent)?;
        let order_id = command.order_id;
        info!(
            order_id = %order_id,
            user_id = %command.user_id,
            symbol = %command.symbol,
            side = %command.side,
            price = %command.price,
            amount = %command.amount,
            "Publishing order"
        );
        self.send(Command::Place(command)).await?;
        Ok(order_id)
    }

    /// Publish a `Cancel` command for `order_id`.
    pub async fn cancel(&self, order_id: OrderId) -> Result<(), PublishError> {
        info!(order_id = %order_id, "Publishing cancel");
        self.send(Command::Cancel(CancelOrder { order_id })).await
    }

    fn build_place(&self, intent: PlaceIntent) -> Result<PlaceOrder, OrderError> {
        let price = match intent.price {
            Some(price) => DecimalText::fixed(price, "price")?,
            None if intent.order_type.requires_price() => {
                return Err(OrderError::InvalidPrice(format!(
                    "{:?} orders require a price",
                    intent.order_type
                )));
            }
            None => DecimalText::zero(),
        };
        let trigger_price = intent
            .trigger_price
            .map(|trigger| DecimalText::fixed(trigger, "trigger_price"))
            .transpose()?;

        let mut command = PlaceOrder {
            order_id: OrderId::new(0),
            user_id: intent.user_id,
            symbol: intent.symbol,
            price,
            amount: DecimalText::fixed(intent.amount, "amount")?,
            side: intent.side,
            order_type: intent.order_type,
            trigger_price,
            timestamp: Utc::now().timestamp(),
        };
        command.validate()?;

        // ids are only spent on commands that will actually be sent
        command.order_id = self.ids.next_id();
        Ok(command)
    }

    async fn send(&self, command: Command) -> Result<(), PublishError> {
        let payload = command.encode()?;
        self.bus
            .publish(&self.subject, Bytes::from(payload))
            .await
            .map_err(|e| {
                warn!(kind = command.kind(), order_id = %command.order_id(), error = %e, "Command publish failed");
                PublishError::Bus(e)
            })
    }
}
