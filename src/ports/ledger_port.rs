//! Trade ledger and security reference-data ports.
//!
//! Both belong to the bookkeeping side of the back office; the analytics core
//! only reads trades and updates prices and overview fields on securities.

use crate::domain::error::QuantvaultError;
use crate::domain::position::{Security, Trade};
use chrono::NaiveDateTime;

pub trait TradeLedgerPort {
    /// Every trade with status ACTIVE.
    fn active_trades(&self) -> Result<Vec<Trade>, QuantvaultError>;
}

pub trait SecurityPort {
    /// All known securities, ordered by ticker.
    fn securities(&self) -> Result<Vec<Security>, QuantvaultError>;

    fn update_price(&self, ticker: &str, price: f64) -> Result<(), QuantvaultError>;

    fn update_overview(
        &self,
        ticker: &str,
        beta: Option<f64>,
        sector: Option<&str>,
        updated_at: NaiveDateTime,
    ) -> Result<(), QuantvaultError>;
}
