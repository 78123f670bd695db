//! Alpha Vantage market-data adapter.
//!
//! Every failure mode (transport, HTTP status, provider notes, malformed
//! payloads) is logged and surfaces as `None`.

use crate::domain::config_validation::MarketDataSettings;
use crate::domain::error::QuantvaultError;
use crate::domain::ohlcv::normalize_ticker;
use crate::ports::market_data_port::{CompanyOverview, DailyBar, MarketDataPort, Quote};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const MAX_RETRIES: u32 = 2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PROVIDER_NOTICE_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

pub struct AlphaVantageAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    quote_cache_ttl: Duration,
    quote_cache: Mutex<HashMap<String, (Instant, Quote)>>,
}

impl AlphaVantageAdapter {
    pub fn new(settings: &MarketDataSettings) -> Result<Self, QuantvaultError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| QuantvaultError::ConfigInvalid {
                section: "market_data".to_string(),
                key: "base_url".to_string(),
                reason: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            quote_cache_ttl: settings.quote_cache_ttl,
            quote_cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached_quote(&self, symbol: &str) -> Option<Quote> {
        let cache = self.quote_cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.get(symbol) {
            Some((at, quote)) if at.elapsed() <= self.quote_cache_ttl => {
                tracing::debug!(ticker = symbol, "quote cache hit");
                Some(quote.clone())
            }
            Some(_) => {
                tracing::debug!(ticker = symbol, "quote cache expired");
                None
            }
            None => None,
        }
    }

    fn store_quote(&self, quote: &Quote) {
        self.quote_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(quote.ticker.clone(), (Instant::now(), quote.clone()));
    }

    /// GET with up to two retries on transport or status failures, sleeping
    /// 1s then 2s between attempts. Provider notices are not retried.
    fn request(&self, params: &[(&str, &str)]) -> Option<Value> {
        for attempt in 0..=MAX_RETRIES {
            let result = self
                .client
                .get(&self.base_url)
                .query(params)
                .query(&[("apikey", self.api_key.as_str())])
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json::<Value>());

            match result {
                Ok(body) => return accept_payload(body),
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Alpha Vantage request failed");
                    if attempt < MAX_RETRIES {
                        thread::sleep(Duration::from_secs(1 << attempt));
                    }
                }
            }
        }
        None
    }
}

/// Drops payloads carrying an error or rate-limit notice.
fn accept_payload(body: Value) -> Option<Value> {
    if let Some(notice) = PROVIDER_NOTICE_KEYS
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
    {
        tracing::warn!(notice, "Alpha Vantage returned a notice");
        return None;
    }
    Some(body)
}

/// Numeric field that may be absent, empty, "None" or "-".
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim().trim_end_matches('%');
            if s.is_empty() || s.eq_ignore_ascii_case("none") || s == "-" {
                None
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .map(str::to_string)
}

pub fn parse_quote(symbol: &str, body: &Value) -> Option<Quote> {
    let quote = body.get("Global Quote")?;
    let price = number(quote.get("05. price"))?;

    Some(Quote {
        ticker: symbol.to_string(),
        price,
        change: number(quote.get("09. change")).unwrap_or(0.0),
        change_percent: number(quote.get("10. change percent")).unwrap_or(0.0),
        volume: number(quote.get("06. volume")).map_or(0, |v| v as i64),
    })
}

/// Bars ascending by date. Adjusted close is preferred over raw close; rows
/// that fail to parse are skipped.
pub fn parse_daily_series(body: &Value) -> Option<Vec<DailyBar>> {
    let series = body.get("Time Series (Daily)")?.as_object()?;

    let mut bars: Vec<DailyBar> = series
        .iter()
        .filter_map(|(date, values)| {
            let date = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!(date = %date, error = %e, "skipping bar with bad date");
                    return None;
                }
            };
            let close = number(values.get("5. adjusted close"))
                .or_else(|| number(values.get("4. close")))?;
            Some(DailyBar {
                date,
                open: number(values.get("1. open"))?,
                high: number(values.get("2. high"))?,
                low: number(values.get("3. low"))?,
                close,
                volume: number(values.get("6. volume"))
                    .or_else(|| number(values.get("5. volume")))
                    .unwrap_or(0.0),
            })
        })
        .collect();

    bars.sort_by_key(|b| b.date);
    Some(bars)
}

/// Beta and sector; other overview fields are ignored.
pub fn parse_overview(body: &Value) -> Option<CompanyOverview> {
    let fields = body.as_object()?;
    if fields.is_empty() {
        return None;
    }
    Some(CompanyOverview {
        beta: number(fields.get("Beta")),
        sector: text(fields.get("Sector")),
    })
}

impl MarketDataPort for AlphaVantageAdapter {
    fn fetch_daily_ohlcv(&self, ticker: &str) -> Option<Vec<DailyBar>> {
        let symbol = normalize_ticker(ticker);
        if symbol.is_empty() {
            return None;
        }
        let body = self.request(&[
            ("function", "TIME_SERIES_DAILY_ADJUSTED"),
            ("symbol", symbol.as_str()),
            ("outputsize", "full"),
        ])?;
        parse_daily_series(&body)
    }

    fn fetch_quote(&self, ticker: &str) -> Option<Quote> {
        let symbol = normalize_ticker(ticker);
        if symbol.is_empty() {
            return None;
        }
        if let Some(quote) = self.cached_quote(&symbol) {
            return Some(quote);
        }

        let body = self.request(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol.as_str())])?;
        let quote = parse_quote(&symbol, &body)?;
        self.store_quote(&quote);
        Some(quote)
    }

    fn fetch_company_overview(&self, ticker: &str) -> Option<CompanyOverview> {
        let symbol = normalize_ticker(ticker);
        if symbol.is_empty() {
            return None;
        }
        let body = self.request(&[("function", "OVERVIEW"), ("symbol", symbol.as_str())])?;
        parse_overview(&body)
    }
}
