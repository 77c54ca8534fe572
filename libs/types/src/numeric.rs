//! Decimal quantities carried as exact text
//!
//! Prices and amounts cross the bus and land in the store as decimal strings.
//! `DecimalText` validates that a string is an exact decimal and keeps the
//! original text untouched, so a value read from an event is persisted
//! byte-for-byte. Outbound command values are rendered at a fixed scale of
//! [`WIRE_SCALE`] fractional digits.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{DecimalTextError, OrderError};

/// Fractional digits used when the gateway renders a decimal for the bus.
pub const WIRE_SCALE: u32 = 8;

/// An exact decimal value together with the text it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecimalText {
    text: String,
    value: Decimal,
}

impl DecimalText {
    /// Parse text that must represent an exact decimal.
    ///
    /// The text is kept verbatim; `"0.10"` and `"0.1"` stay distinct strings.
    pub fn parse(text: impl Into<String>) -> Result<Self, DecimalTextError> {
        let text = text.into();
        match Decimal::from_str_exact(&text) {
            Ok(value) => Ok(Self { text, value }),
            Err(_) => Err(DecimalTextError(text)),
        }
    }

    /// Render `value` at [`WIRE_SCALE`] digits.
    ///
    /// Values needing more digits are rejected instead of rounded.
    pub fn fixed(value: Decimal, field: &'static str) -> Result<Self, OrderError> {
        if value.normalize().scale() > WIRE_SCALE {
            return Err(OrderError::TooPrecise {
                field,
                value: value.to_string(),
                max: WIRE_SCALE,
            });
        }
        let mut scaled = value;
        scaled.rescale(WIRE_SCALE);
        // rescale caps the scale when the integer part leaves no room
        if scaled.scale() != WIRE_SCALE {
            return Err(OrderError::OutOfRange {
                field,
                value: value.to_string(),
            });
        }
        Ok(Self {
            text: scaled.to_string(),
            value,
        })
    }

    /// `0` rendered at wire scale, used for market orders without a limit price.
    pub fn zero() -> Self {
        let mut zero = Decimal::ZERO;
        zero.rescale(WIRE_SCALE);
        Self {
            text: zero.to_string(),
            value: Decimal::ZERO,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.value < Decimal::ZERO
    }
}

impl fmt::Display for DecimalText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for DecimalText {
    type Err = DecimalTextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DecimalText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for DecimalText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalTextVisitor)
    }
}

struct DecimalTextVisitor;

impl<'de> Visitor<'de> for DecimalTextVisitor {
    type Value = DecimalText;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        DecimalText::parse(v).map_err(E::custom)
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        DecimalText::parse(v).map_err(E::custom)
    }

    // Integers are exact; floats are refused since their text is already lossy.
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        DecimalText::parse(v.to_string()).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        DecimalText::parse(v.to_string()).map_err(E::custom)
    }
}
