pub mod health;
pub mod order;
pub mod trade;
pub mod ws;
