//! Trade types
//!
//! `Trade` is the value the engine reports in `TradeExecuted` and the value
//! rebroadcast to WebSocket subscribers. `TradeRecord` is the persisted row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, TradeId};
use crate::numeric::DecimalText;

/// A matched trade as reported by the engine.
///
/// By engine convention the seller's order is the resting (maker) order and
/// the buyer's order is the aggressing (taker) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub buyer_order_id: OrderId,
    pub seller_order_id: OrderId,
    pub price: DecimalText,
    pub amount: DecimalText,
    #[serde(default)]
    pub timestamp: i64,
}

impl Trade {
    pub fn maker_order_id(&self) -> OrderId {
        self.seller_order_id
    }

    pub fn taker_order_id(&self) -> OrderId {
        self.buyer_order_id
    }
}

/// Persisted trade row, immutable once written.
///
/// `id` is assigned by the store. The engine restarts its trade counter for
/// every incoming order, so `engine_trade_id` is kept but not unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: TradeId,
    pub engine_trade_id: TradeId,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub price: DecimalText,
    pub amount: DecimalText,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maker_is_seller() {
        let trade: Trade = serde_json::from_str(
            r#"{"trade_id":1,"buyer_order_id":11,"seller_order_id":10,"price":"50000","amount":"0.1"}"#,
        )
        .unwrap();

        assert_eq!(trade.maker_order_id(), OrderId::new(10));
        assert_eq!(trade.taker_order_id(), OrderId::new(11));
        assert_eq!(trade.timestamp, 0);
        assert_eq!(trade.price.as_str(), "50000");
        assert_eq!(trade.amount.as_str(), "0.1");
    }

    #[test]
    fn test_trade_wire_fields() {
        let trade = Trade {
            trade_id: TradeId::new(3),
            buyer_order_id: OrderId::new(5),
            seller_order_id: OrderId::new(4),
            price: DecimalText::parse("101.5").unwrap(),
            amount: DecimalText::parse("2").unwrap(),
            timestamp: 1_708_123_456,
        };

        let value = serde_json::to_value(&trade).unwrap();
        assert_eq!(value["trade_id"], 3);
        assert_eq!(value["buyer_order_id"], 5);
        assert_eq!(value["seller_order_id"], 4);
        assert_eq!(value["price"], "101.5");
        assert_eq!(value["amount"], "2");
        assert_eq!(value["timestamp"], 1_708_123_456);
    }
}
