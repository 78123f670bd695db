//! External market-data provider port.
//!
//! Implementations never return errors: network failures, provider rate-limit
//! notes and malformed payloads all come back as `None`.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CompanyOverview {
    pub beta: Option<f64>,
    pub sector: Option<String>,
}

pub trait MarketDataPort {
    /// Full daily history, ascending by date.
    fn fetch_daily_ohlcv(&self, ticker: &str) -> Option<Vec<DailyBar>>;

    fn fetch_quote(&self, ticker: &str) -> Option<Quote>;

    fn fetch_company_overview(&self, ticker: &str) -> Option<CompanyOverview>;
}
