//! Indicator cache manager.
//!
//! Reads bars from the bar store, runs the fixed indicator set over them and
//! upserts every defined point into the indicator store. Readers only ever see
//! what has been cached; nothing here computes on read except
//! [`IndicatorCache::get_or_compute`].

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::error::QuantvaultError;
use super::indicator::{
    calculate_atr, calculate_bollinger, calculate_ema, calculate_macd, calculate_rsi,
    calculate_sma, IndicatorType, Series,
};
use super::ohlcv::{normalize_ticker, Interval, PriceBar};
use crate::ports::data_port::PriceBarPort;
use crate::ports::indicator_port::IndicatorPort;

/// Fewer bars than this and nothing is computed.
pub const MIN_BARS: usize = 20;
pub const COMPUTE_LOOKBACK_DAYS: i64 = 365;
pub const READ_LOOKBACK_DAYS: i64 = 180;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRecord {
    pub ticker: String,
    pub indicator_type: String,
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
    pub parameters: Option<serde_json::Value>,
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, QuantvaultError> {
        if start > end {
            return Err(QuantvaultError::invalid_input(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        Ok(DateRange { start, end })
    }

    /// `days` calendar days back from `end`, inclusive of both ends.
    pub fn trailing(days: i64, end: NaiveDate) -> Self {
        DateRange {
            start: end - Duration::days(days),
            end,
        }
    }

    /// Fill in whichever ends are missing with the trailing window ending at `today`.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        lookback_days: i64,
        today: NaiveDate,
    ) -> Result<Self, QuantvaultError> {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or(end - Duration::days(lookback_days));
        DateRange::new(start, end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComputeOutcome {
    InsufficientData {
        ticker: String,
        bars: usize,
    },
    Computed {
        ticker: String,
        bars: usize,
        indicators: Vec<String>,
        points_written: usize,
    },
}

fn defined_records(
    ticker: &str,
    kind: IndicatorType,
    timestamps: &[NaiveDateTime],
    values: &Series,
    parameters: impl Fn(usize) -> Option<serde_json::Value>,
) -> Vec<IndicatorRecord> {
    let key = kind.key();
    timestamps
        .iter()
        .zip(values)
        .enumerate()
        .filter_map(|(i, (ts, v))| {
            v.map(|value| IndicatorRecord {
                ticker: ticker.to_string(),
                indicator_type: key.clone(),
                timestamp: *ts,
                value: Some(value),
                parameters: parameters(i),
            })
        })
        .collect()
}

/// Records for every defined point of `kind` over `bars` (ascending).
pub fn indicator_records(ticker: &str, kind: IndicatorType, bars: &[PriceBar]) -> Vec<IndicatorRecord> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let timestamps: Vec<NaiveDateTime> = bars.iter().map(|b| b.timestamp).collect();

    match kind {
        IndicatorType::Sma(period) => {
            defined_records(ticker, kind, &timestamps, &calculate_sma(&closes, period), |_| None)
        }
        IndicatorType::Ema(period) => {
            defined_records(ticker, kind, &timestamps, &calculate_ema(&closes, period), |_| None)
        }
        IndicatorType::Rsi(period) => {
            defined_records(ticker, kind, &timestamps, &calculate_rsi(&closes, period), |_| None)
        }
        IndicatorType::Atr(period) => {
            let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
            let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
            let atr = calculate_atr(&highs, &lows, &closes, period);
            defined_records(ticker, kind, &timestamps, &atr, |_| None)
        }
        IndicatorType::Macd { fast, slow, signal } => {
            let macd = calculate_macd(&closes, fast, slow, signal);
            defined_records(ticker, kind, &timestamps, &macd.line, |i| {
                Some(json!({ "signal": macd.signal[i], "histogram": macd.histogram[i] }))
            })
        }
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        } => {
            let bands = calculate_bollinger(&closes, period, stddev_mult_x100);
            defined_records(ticker, kind, &timestamps, &bands.middle, |i| {
                Some(json!({ "upper": bands.upper[i], "lower": bands.lower[i] }))
            })
        }
    }
}

pub struct IndicatorCache<'a> {
    pub bars: &'a dyn PriceBarPort,
    pub store: &'a dyn IndicatorPort,
}

impl IndicatorCache<'_> {
    pub fn compute_and_store(
        &self,
        ticker: &str,
        interval: Interval,
        range: DateRange,
    ) -> Result<ComputeOutcome, QuantvaultError> {
        let ticker = normalize_ticker(ticker);
        let bars = self
            .bars
            .fetch_bars(&ticker, interval, range.start, range.end)?;

        if bars.len() < MIN_BARS {
            debug!(ticker = %ticker, bars = bars.len(), "insufficient bars for indicators");
            return Ok(ComputeOutcome::InsufficientData {
                ticker,
                bars: bars.len(),
            });
        }

        let mut indicators = Vec::new();
        let mut records = Vec::new();
        for kind in IndicatorType::cached_set() {
            indicators.push(kind.key());
            records.extend(indicator_records(&ticker, kind, &bars));
        }
        let points_written = self.store.upsert_indicator_values(&records)?;

        info!(
            ticker = %ticker,
            bars = bars.len(),
            points = points_written,
            "indicators computed and stored"
        );
        Ok(ComputeOutcome::Computed {
            ticker,
            bars: bars.len(),
            indicators,
            points_written,
        })
    }

    /// Cached values per requested type; uncached types map to an empty list.
    pub fn get_indicator_values(
        &self,
        ticker: &str,
        types: &[IndicatorType],
        range: DateRange,
    ) -> Result<BTreeMap<String, Vec<IndicatorRecord>>, QuantvaultError> {
        let ticker = normalize_ticker(ticker);
        let mut out = BTreeMap::new();
        for kind in types {
            let key = kind.key();
            let values = self
                .store
                .fetch_indicator_values(&ticker, &key, range.start, range.end)?;
            out.insert(key, values);
        }
        Ok(out)
    }

    pub fn latest_value(
        &self,
        ticker: &str,
        kind: IndicatorType,
    ) -> Result<Option<IndicatorRecord>, QuantvaultError> {
        self.store
            .latest_indicator_value(&normalize_ticker(ticker), &kind.key())
    }

    /// Read, and when nothing at all is cached for the requested types, compute
    /// daily indicators once over `compute_range` and read again.
    pub fn get_or_compute(
        &self,
        ticker: &str,
        types: &[IndicatorType],
        range: DateRange,
        compute_range: DateRange,
    ) -> Result<BTreeMap<String, Vec<IndicatorRecord>>, QuantvaultError> {
        let values = self.get_indicator_values(ticker, types, range)?;
        if values.values().any(|v| !v.is_empty()) {
            return Ok(values);
        }
        match self.compute_and_store(ticker, Interval::Daily, compute_range)? {
            ComputeOutcome::Computed { .. } => self.get_indicator_values(ticker, types, range),
            ComputeOutcome::InsufficientData { .. } => Ok(values),
        }
    }
}
