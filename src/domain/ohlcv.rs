//! OHLCV price bar representation.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::QuantvaultError;

/// Bar interval. Daily bars are timestamped at midnight of their trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "60min")]
    OneHour,
    Daily,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::OneHour => "60min",
            Interval::Daily => "daily",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = QuantvaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1min" => Ok(Interval::OneMinute),
            "5min" => Ok(Interval::FiveMinutes),
            "15min" => Ok(Interval::FifteenMinutes),
            "60min" => Ok(Interval::OneHour),
            "daily" | "1d" => Ok(Interval::Daily),
            other => Err(QuantvaultError::invalid_input(format!(
                "unknown interval '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    pub ticker: String,
    pub interval: Interval,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl PriceBar {
    /// Daily bar keyed at midnight of `date`.
    pub fn daily(
        ticker: &str,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    ) -> Self {
        PriceBar {
            ticker: normalize_ticker(ticker),
            interval: Interval::Daily,
            timestamp: date.and_time(chrono::NaiveTime::MIN),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Fold a live quote into this bar: widen the range and move the close.
    pub fn absorb_quote(&mut self, price: f64, volume: Option<f64>) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume = volume;
    }
}

/// max(high - low, |high - prev_close|, |low - prev_close|)
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    let hl = high - low;
    let hc = (high - prev_close).abs();
    let lc = (low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Tickers are stored upper-case and trimmed everywhere.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}
