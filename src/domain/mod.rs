//! Core domain types and analytics services.

pub mod ohlcv;
pub mod position;
pub mod holdings;
pub mod portfolio;
pub mod indicator;
pub mod indicator_cache;
pub mod risk;
pub mod strategy;
pub mod strategy_eval;
pub mod rate_limit;
pub mod backfill;
pub mod price_refresh;
pub mod config_validation;
pub mod error;
