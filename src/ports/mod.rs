//! Port traits: the seams between analytics logic and storage or providers.

pub mod config_port;
pub mod data_port;
pub mod holdings_port;
pub mod indicator_port;
pub mod ledger_port;
pub mod market_data_port;
pub mod signal_port;
