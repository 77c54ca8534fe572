//! Events emitted by the matching engine
//!
//! Wire shape: `{"type": "OrderPlaced" | "TradeExecuted" | "OrderCancelled",
//! "data": {...}}`. Decoding reads the discriminator first so that an
//! envelope of an unknown kind is reported as [`DecodeError::UnknownKind`]
//! rather than as a malformed payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::DecodeError;
use crate::ids::{OrderId, UserId};
use crate::numeric::DecimalText;
use crate::order::{OrderType, Side};
use crate::trade::Trade;

/// Tagged event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    OrderPlaced(OrderPlaced),
    TradeExecuted(TradeExecuted),
    OrderCancelled(OrderCancelled),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl EngineEvent {
    /// Decode an envelope received on the event subject.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes).map_err(DecodeError::Envelope)?;

        match raw.kind.as_str() {
            "OrderPlaced" => payload("OrderPlaced", raw.data).map(EngineEvent::OrderPlaced),
            "TradeExecuted" => payload("TradeExecuted", raw.data).map(EngineEvent::TradeExecuted),
            "OrderCancelled" => payload("OrderCancelled", raw.data).map(EngineEvent::OrderCancelled),
            _ => Err(DecodeError::UnknownKind(raw.kind)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::OrderPlaced(_) => "OrderPlaced",
            EngineEvent::TradeExecuted(_) => "TradeExecuted",
            EngineEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

fn payload<T: DeserializeOwned>(
    kind: &'static str,
    data: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload { kind, source })
}

/// The engine accepted an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    #[serde(alias = "id")]
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: String,
    pub price: DecimalText,
    pub amount: DecimalText,
    pub side: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<DecimalText>,
    /// Engine-assigned status label, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// A trade was executed.
///
/// Serialized as `{"trade": {...}}`; decoding also accepts the trade fields
/// directly under `data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeExecuted {
    pub trade: Trade,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TradePayload {
    Nested { trade: Trade },
    Flat(Trade),
}

impl<'de> Deserialize<'de> for TradeExecuted {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let trade = match TradePayload::deserialize(deserializer)? {
            TradePayload::Nested { trade } | TradePayload::Flat(trade) => trade,
        };
        Ok(Self { trade })
    }
}

/// Outcome of a cancel command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub success: bool,
}
