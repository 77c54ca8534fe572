//! Types library for the gateway real-time core
//!
//! Wire envelopes exchanged with the matching engine and the rows the gateway
//! persists. Every price and amount is carried as exact decimal text.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, TradeId, UserId, Symbol)
//! - `numeric`: Exact decimal text (`DecimalText`)
//! - `order`: Side, order type, order status and the persisted order row
//! - `trade`: Engine trade value and the persisted trade row
//! - `command`: Commands published to the engine
//! - `event`: Events consumed from the engine
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod order;
pub mod trade;
pub mod command;
pub mod event;
pub mod errors;

