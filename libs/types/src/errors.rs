//! Error types shared across the gateway core
//!
//! Validation failures for user intents and decode failures for bus envelopes.

use thiserror::Error;

/// Validation errors for an order intent, raised before anything is published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid trigger price: {0}")]
    InvalidTriggerPrice(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Too many fractional digits in {field}: {value} (max {max})")]
    TooPrecise {
        field: &'static str,
        value: String,
        max: u32,
    },

    #[error("{field} too large to carry 8 fractional digits: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

/// Decimal text parse error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("not an exact decimal: {0:?}")]
pub struct DecimalTextError(pub String);

/// Errors decoding a tagged envelope received from the bus.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("Malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown event kind: {0}")]
    UnknownKind(String),
}

impl DecodeError {
    /// Whether this is a well-formed envelope carrying a kind we do not handle.
    pub fn is_unknown_kind(&self) -> bool {
        matches!(self, DecodeError::UnknownKind(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InvalidPrice("must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid price: must be positive");
    }

    #[test]
    fn test_too_precise_mentions_field() {
        let err = OrderError::TooPrecise {
            field: "amount",
            value: "0.000000001".to_string(),
            max: 8,
        };
        assert!(err.to_string().contains("amount"));
        assert!(err.to_string().contains("max 8"));
    }

    #[test]
    fn test_unknown_kind_classification() {
        assert!(DecodeError::UnknownKind("OrderAmended".into()).is_unknown_kind());
        let malformed = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(!DecodeError::Envelope(malformed).is_unknown_kind());
    }
}
