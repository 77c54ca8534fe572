//! Gateway real-time core
//!
//! Publishes order commands to the matching engine, ingests the events it
//! emits into the store, and fans trades and market data out to WebSocket
//! subscribers through a single hub.

pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod ingest;
pub mod models;
pub mod publisher;
pub mod rate_limit;
pub mod relay;
pub mod router;
pub mod shutdown;
pub mod state;
pub mod store;
