#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use quantvault::adapters::sqlite_adapter::SqliteAdapter;
use quantvault::domain::ohlcv::PriceBar;
use quantvault::domain::position::Security;
use quantvault::domain::rate_limit::RateLimiter;
use quantvault::ports::market_data_port::{CompanyOverview, DailyBar, MarketDataPort, Quote};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted provider. Tickers without an entry behave like a provider
/// failure and return `None`.
#[derive(Default)]
pub struct FakeMarketData {
    pub daily: HashMap<String, Vec<DailyBar>>,
    pub quotes: HashMap<String, Quote>,
    pub overviews: HashMap<String, CompanyOverview>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_daily(mut self, ticker: &str, bars: Vec<DailyBar>) -> Self {
        self.daily.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_quote(mut self, ticker: &str, price: f64, volume: i64) -> Self {
        self.quotes.insert(
            ticker.to_string(),
            Quote {
                ticker: ticker.to_string(),
                price,
                change: 0.0,
                change_percent: 0.0,
                volume,
            },
        );
        self
    }

    pub fn with_overview(mut self, ticker: &str, beta: f64, sector: &str) -> Self {
        self.overviews.insert(
            ticker.to_string(),
            CompanyOverview {
                beta: Some(beta),
                sector: Some(sector.to_string()),
                ..CompanyOverview::default()
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MarketDataPort for FakeMarketData {
    fn fetch_daily_ohlcv(&self, ticker: &str) -> Option<Vec<DailyBar>> {
        self.record(format!("daily:{ticker}"));
        self.daily.get(ticker).cloned()
    }

    fn fetch_quote(&self, ticker: &str) -> Option<Quote> {
        self.record(format!("quote:{ticker}"));
        self.quotes.get(ticker).cloned()
    }

    fn fetch_company_overview(&self, ticker: &str) -> Option<CompanyOverview> {
        self.record(format!("overview:{ticker}"));
        self.overviews.get(ticker).cloned()
    }
}

/// Counts acquisitions instead of sleeping.
#[derive(Default)]
pub struct RecordingLimiter {
    pub acquired: AtomicUsize,
}

impl RecordingLimiter {
    pub fn count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

impl RateLimiter for RecordingLimiter {
    fn acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn store() -> SqliteAdapter {
    let store = SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One provider bar per calendar day from `start`, closing at `closes[i]`.
pub fn daily_series(start: NaiveDate, closes: &[f64]) -> Vec<DailyBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| DailyBar {
            date: start + Duration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000.0,
        })
        .collect()
}

pub fn price_bars(ticker: &str, start: NaiveDate, closes: &[f64]) -> Vec<PriceBar> {
    daily_series(start, closes)
        .iter()
        .map(|b| PriceBar::daily(ticker, b.date, b.open, b.high, b.low, b.close, Some(b.volume)))
        .collect()
}

/// Closes that fall steadily, driving RSI towards zero.
pub fn falling_closes(n: usize) -> Vec<f64> {
    (0..n).map(|i| 200.0 - i as f64).collect()
}

pub fn security(ticker: &str, price: f64, sector: Option<&str>, beta: Option<f64>) -> Security {
    Security {
        ticker: ticker.to_string(),
        name: format!("{ticker} Corp"),
        price,
        sector: sector.map(str::to_string),
        beta,
        overview_updated_at: None,
    }
}
