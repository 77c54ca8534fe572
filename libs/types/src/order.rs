//! Order types
//!
//! Side and order type as the matching engine names them on the wire, the
//! persisted order status with its allowed transitions, and the persisted
//! order row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OrderError;
use crate::ids::{OrderId, UserId};
use crate::numeric::DecimalText;

/// Order side. The engine spells these `Bid` and `Ask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "Bid",
            Side::Ask => "Ask",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the engine names as well as `buy`/`sell` in any case.
impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bid" | "buy" => Ok(Side::Bid),
            "ask" | "sell" => Ok(Side::Ask),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Order type understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    Limit,
    Market,
    StopLimit,
}

impl OrderType {
    /// Whether a positive limit price is mandatory.
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    /// Whether a positive trigger price is mandatory.
    pub fn requires_trigger(&self) -> bool {
        matches!(self, OrderType::StopLimit)
    }
}

/// Persisted order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed by the engine, not yet known to rest on the book
    Pending,
    /// Resting on the book
    Open,
    /// Completely matched (terminal)
    Filled,
    /// Cancelled (terminal)
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Open,
        OrderStatus::Filled,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::Pending, OrderStatus::Open)
            | (OrderStatus::Pending, OrderStatus::Filled)
            | (OrderStatus::Pending, OrderStatus::Cancelled)
            | (OrderStatus::Open, OrderStatus::Filled)
            | (OrderStatus::Open, OrderStatus::Cancelled) => true,
            _ => false,
        }
    }

    /// Statuses from which `self` may be entered.
    pub fn predecessors(&self) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(*self))
            .collect()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "open" => Ok(OrderStatus::Open),
            "filled" => Ok(OrderStatus::Filled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Persisted order row.
///
/// Created from an `OrderPlaced` event and afterwards only status-updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub symbol: String,
    pub price: DecimalText,
    pub amount: DecimalText,
    pub side: Side,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Apply a status transition.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}
