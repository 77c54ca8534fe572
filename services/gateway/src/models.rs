use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{OrderId, UserId};
use types::order::{OrderType, Side};

use crate::error::AppError;
use crate::ingest::IngestSnapshot;
use crate::publisher::PlaceIntent;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    /// `Bid`, `Ask`, `buy` or `sell`
    pub side: String,
    #[serde(default)]
    pub order_type: Option<OrderType>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(alias = "quantity")]
    pub amount: Decimal,
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
}

impl CreateOrderRequest {
    pub fn into_intent(self, user_id: UserId) -> Result<PlaceIntent, AppError> {
        let side: Side = self.side.parse().map_err(AppError::BadRequest)?;
        Ok(PlaceIntent {
            user_id,
            symbol: self.symbol.trim().to_string(),
            side,
            order_type: self.order_type.unwrap_or_default(),
            price: self.price,
            amount: self.amount,
            trigger_price: self.trigger_price,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub status: String,
}

impl OrderResponse {
    pub fn submitted(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: "submitted".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
    pub ingest: IngestSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_buy_sell_and_quantity_alias() {
        let request: CreateOrderRequest = serde_json::from_str(
            r#"{"symbol":"BTC/USDT","side":"sell","order_type":"Limit","price":"50000.5","quantity":"0.25"}"#,
        )
        .unwrap();
        let intent = request.into_intent(UserId::new(3)).unwrap();

        assert_eq!(intent.side, Side::Ask);
        assert_eq!(intent.amount.to_string(), "0.25");
        assert_eq!(intent.price.unwrap().to_string(), "50000.5");
        assert_eq!(intent.user_id, UserId::new(3));
    }

    #[test]
    fn test_order_type_defaults_to_limit() {
        let request: CreateOrderRequest =
            serde_json::from_str(r#"{"symbol":"BTC/USDT","side":"Bid","price":"1","amount":"1"}"#)
                .unwrap();
        let intent = request.into_intent(UserId::new(1)).unwrap();
        assert_eq!(intent.order_type, OrderType::Limit);
    }

    #[test]
    fn test_unknown_side_is_bad_request() {
        let request: CreateOrderRequest =
            serde_json::from_str(r#"{"symbol":"BTC/USDT","side":"long","price":"1","amount":"1"}"#)
                .unwrap();
        assert!(matches!(
            request.into_intent(UserId::new(1)),
            Err(AppError::BadRequest(_))
        ));
    }
}
