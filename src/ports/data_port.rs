//! Price bar repository port.

use crate::domain::error::QuantvaultError;
use crate::domain::ohlcv::{Interval, PriceBar};
use chrono::{NaiveDate, NaiveDateTime};

pub trait PriceBarPort {
    /// Bars for one ticker/interval with `start <= date <= end`, ascending by timestamp.
    fn fetch_bars(
        &self,
        ticker: &str,
        interval: Interval,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuantvaultError>;

    /// Daily bars for one ticker, or every ticker when `ticker` is `None`,
    /// ordered by ticker then timestamp.
    fn fetch_daily_bars(
        &self,
        ticker: Option<&str>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuantvaultError>;

    fn find_bar(
        &self,
        ticker: &str,
        interval: Interval,
        timestamp: NaiveDateTime,
    ) -> Result<Option<PriceBar>, QuantvaultError>;

    /// Insert unless a bar already exists at the natural key. Returns `true` when inserted.
    fn insert_bar_if_absent(&self, bar: &PriceBar) -> Result<bool, QuantvaultError>;

    /// Insert or overwrite the bar at its natural key.
    fn upsert_bar(&self, bar: &PriceBar) -> Result<(), QuantvaultError>;
}
