//! Commands sent to the matching engine
//!
//! Wire shape: `{"type": "Place" | "Cancel", "data": {...}}`. Commands are
//! fire-and-forget; the engine reports outcomes later as events.

use serde::{Deserialize, Serialize};

use crate::errors::OrderError;
use crate::ids::{OrderId, Symbol, UserId};
use crate::numeric::DecimalText;
use crate::order::{OrderType, Side};

/// Tagged command envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Command {
    Place(PlaceOrder),
    Cancel(CancelOrder),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Place(_) => "Place",
            Command::Cancel(_) => "Cancel",
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            Command::Place(place) => place.order_id,
            Command::Cancel(cancel) => cancel.order_id,
        }
    }

    /// Serialize to the JSON bytes published on the command subject.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Place payload, field-compatible with the engine's order struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    #[serde(rename = "id", alias = "order_id")]
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: String,
    pub price: DecimalText,
    pub amount: DecimalText,
    pub side: Side,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<DecimalText>,
    /// Unix seconds
    pub timestamp: i64,
}

impl PlaceOrder {
    /// Check the preconditions every Place command must satisfy before it
    /// may be published.
    pub fn validate(&self) -> Result<(), OrderError> {
        if Symbol::try_new(self.symbol.as_str()).is_none() {
            return Err(OrderError::InvalidSymbol(self.symbol.clone()));
        }

        if !self.amount.is_positive() {
            return Err(OrderError::InvalidAmount(format!(
                "amount must be greater than zero, got {}",
                self.amount
            )));
        }

        if self.price.is_negative() {
            return Err(OrderError::InvalidPrice(format!(
                "price must not be negative, got {}",
                self.price
            )));
        }

        if self.order_type.requires_price() && !self.price.is_positive() {
            return Err(OrderError::InvalidPrice(format!(
                "{:?} orders require a price greater than zero, got {}",
                self.order_type, self.price
            )));
        }

        match (&self.trigger_price, self.order_type.requires_trigger()) {
            (Some(trigger), true) if !trigger.is_positive() => Err(OrderError::InvalidTriggerPrice(
                format!("trigger price must be greater than zero, got {trigger}"),
            )),
            (None, true) => Err(OrderError::InvalidTriggerPrice(
                "StopLimit orders require a trigger price".to_string(),
            )),
            (Some(_), false) => Err(OrderError::InvalidTriggerPrice(
                "trigger price is only valid for StopLimit orders".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Cancel payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
}
