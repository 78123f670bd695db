//! Historical daily price backfill from the market-data provider.

use serde::Serialize;
use tracing::{info, warn};

use super::error::QuantvaultError;
use super::ohlcv::{normalize_ticker, PriceBar};
use super::rate_limit::RateLimiter;
use crate::ports::data_port::PriceBarPort;
use crate::ports::ledger_port::SecurityPort;
use crate::ports::market_data_port::{DailyBar, MarketDataPort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillReport {
    pub ticker: String,
    pub status: BackfillStatus,
    pub inserted: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BackfillReport {
    fn failed(ticker: String, message: impl Into<String>) -> Self {
        BackfillReport {
            ticker,
            status: BackfillStatus::Failed,
            inserted: 0,
            skipped: 0,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillSummary {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub failed_tickers: Vec<String>,
    pub results: Vec<BackfillReport>,
}

impl BackfillSummary {
    fn from_reports(results: Vec<BackfillReport>) -> Self {
        BackfillSummary {
            total: results.len(),
            inserted: results.iter().map(|r| r.inserted).sum(),
            skipped: results.iter().map(|r| r.skipped).sum(),
            failed_tickers: results
                .iter()
                .filter(|r| r.status == BackfillStatus::Failed)
                .map(|r| r.ticker.clone())
                .collect(),
            results,
        }
    }
}

fn to_price_bar(ticker: &str, bar: &DailyBar) -> PriceBar {
    PriceBar::daily(
        ticker,
        bar.date,
        bar.open,
        bar.high,
        bar.low,
        bar.close,
        Some(bar.volume),
    )
}

pub struct BackfillService<'a> {
    pub provider: &'a dyn MarketDataPort,
    pub bars: &'a dyn PriceBarPort,
    pub securities: &'a dyn SecurityPort,
    pub limiter: &'a dyn RateLimiter,
}

impl BackfillService<'_> {
    /// Fetch full daily history for `ticker` and insert bars not already stored.
    /// Existing bars are never overwritten, so a rerun only adds new days.
    pub fn backfill_ticker(&self, ticker: &str) -> Result<BackfillReport, QuantvaultError> {
        let ticker = normalize_ticker(ticker);
        info!(ticker = %ticker, "backfilling price history");

        self.limiter.acquire();
        let Some(history) = self.provider.fetch_daily_ohlcv(&ticker) else {
            warn!(ticker = %ticker, "provider returned no daily history");
            return Ok(BackfillReport::failed(ticker, "Failed to fetch data"));
        };
        if history.is_empty() {
            return Ok(BackfillReport::failed(ticker, "Failed to fetch data"));
        }

        let mut inserted = 0;
        let mut skipped = 0;
        for daily in &history {
            if self.bars.insert_bar_if_absent(&to_price_bar(&ticker, daily))? {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }

        info!(ticker = %ticker, inserted, skipped, "backfill complete");
        Ok(BackfillReport {
            ticker,
            status: BackfillStatus::Success,
            inserted,
            skipped,
            message: None,
        })
    }

    /// Backfill every known security in ticker order. A failing ticker is
    /// reported and the batch moves on.
    pub fn backfill_all(&self) -> Result<BackfillSummary, QuantvaultError> {
        let mut tickers: Vec<String> = self
            .securities
            .securities()?
            .into_iter()
            .map(|s| s.ticker)
            .collect();
        tickers.sort();

        let reports: Vec<BackfillReport> = tickers
            .into_iter()
            .map(|ticker| {
                self.backfill_ticker(&ticker).unwrap_or_else(|e| {
                    warn!(ticker = %ticker, error = %e, "backfill failed");
                    BackfillReport::failed(ticker, e.to_string())
                })
            })
            .collect();

        let summary = BackfillSummary::from_reports(reports);
        info!(
            total = summary.total,
            failed = summary.failed_tickers.len(),
            "backfill batch finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn provider_bar_becomes_midnight_daily_bar() {
        let daily = DailyBar {
            date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 1234.0,
        };
        let bar = to_price_bar("msft", &daily);
        assert_eq!(bar.ticker, "MSFT");
        assert_eq!(bar.timestamp.to_string(), "2024-02-29 00:00:00");
        assert_eq!(bar.volume, Some(1234.0));
    }

    #[test]
    fn summary_collects_failures() {
        let ok = BackfillReport {
            ticker: "AAPL".to_string(),
            status: BackfillStatus::Success,
            inserted: 10,
            skipped: 2,
            message: None,
        };
        let bad = BackfillReport::failed("ZZZ".to_string(), "Failed to fetch data");
        let summary = BackfillSummary::from_reports(vec![ok, bad]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.inserted, 10);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed_tickers, vec!["ZZZ".to_string()]);
    }

    #[test]
    fn failed_report_serializes_status_and_message() {
        let report = BackfillReport::failed("ZZZ".to_string(), "boom");
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["message"], "boom");
    }
}
