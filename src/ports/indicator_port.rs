//! Indicator value store port.

use crate::domain::error::QuantvaultError;
use crate::domain::indicator_cache::IndicatorRecord;
use chrono::NaiveDate;

pub trait IndicatorPort {
    /// Upsert by `(ticker, indicator_type, timestamp)`: overwrite value and
    /// parameters when the key exists, insert otherwise. Returns rows written.
    fn upsert_indicator_values(&self, records: &[IndicatorRecord]) -> Result<usize, QuantvaultError>;

    /// Cached values for one type with `start <= date <= end`, ascending.
    fn fetch_indicator_values(
        &self,
        ticker: &str,
        indicator_type: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<IndicatorRecord>, QuantvaultError>;

    fn latest_indicator_value(
        &self,
        ticker: &str,
        indicator_type: &str,
    ) -> Result<Option<IndicatorRecord>, QuantvaultError>;
}
