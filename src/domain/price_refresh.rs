//! Batch price refresh and its single-flight coordinator.
//!
//! A refresh walks every security, pulls a live quote, folds it into today's
//! daily bar and then re-derives everything downstream of prices: the daily
//! portfolio snapshot, materialized holdings, indicators and signals.

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{info, warn};

use super::error::QuantvaultError;
use super::holdings::recompute_holdings;
use super::indicator_cache::{DateRange, IndicatorCache, COMPUTE_LOOKBACK_DAYS};
use super::ohlcv::{Interval, PriceBar};
use super::portfolio::take_snapshot;
use super::position::Security;
use super::rate_limit::RateLimiter;
use super::strategy_eval::StrategyEngine;
use crate::ports::data_port::PriceBarPort;
use crate::ports::holdings_port::{HoldingsPort, SnapshotPort};
use crate::ports::indicator_port::IndicatorPort;
use crate::ports::ledger_port::{SecurityPort, TradeLedgerPort};
use crate::ports::market_data_port::{MarketDataPort, Quote};
use crate::ports::signal_port::{SignalPort, StrategyPort};

pub const OVERVIEW_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub updated_count: usize,
    pub failed_count: usize,
    pub updated_tickers: Vec<String>,
    pub failed_tickers: Vec<String>,
    pub signals_generated: usize,
}

pub struct PriceRefresher<'a> {
    pub provider: &'a dyn MarketDataPort,
    pub limiter: &'a dyn RateLimiter,
    pub bars: &'a dyn PriceBarPort,
    pub securities: &'a dyn SecurityPort,
    pub ledger: &'a dyn TradeLedgerPort,
    pub holdings: &'a dyn HoldingsPort,
    pub snapshots: &'a dyn SnapshotPort,
    pub indicators: &'a dyn IndicatorPort,
    pub strategies: &'a dyn StrategyPort,
    pub signals: &'a dyn SignalPort,
}

/// Fold a quote into the stored bar for the quote's day, or start a new bar.
pub fn merge_quote_bar(existing: Option<PriceBar>, template: PriceBar, quote: &Quote) -> PriceBar {
    let volume = Some(quote.volume as f64);
    match existing {
        Some(mut bar) => {
            bar.absorb_quote(quote.price, volume);
            bar
        }
        None => PriceBar {
            open: quote.price,
            high: quote.price,
            low: quote.price,
            close: quote.price,
            volume,
            ..template
        },
    }
}

pub fn overview_is_stale(security: &Security, now: NaiveDateTime) -> bool {
    match security.overview_updated_at {
        None => true,
        Some(at) => now - at > Duration::hours(OVERVIEW_MAX_AGE_HOURS),
    }
}

impl PriceRefresher<'_> {
    fn upsert_today_bar(&self, quote: &Quote, now: NaiveDateTime) -> Result<(), QuantvaultError> {
        let template = PriceBar::daily(&quote.ticker, now.date(), 0.0, 0.0, 0.0, 0.0, None);
        let existing = self
            .bars
            .find_bar(&template.ticker, Interval::Daily, template.timestamp)?;
        self.bars
            .upsert_bar(&merge_quote_bar(existing, template, quote))
    }

    fn refresh_quote(&self, security: &Security, now: NaiveDateTime) -> Result<bool, QuantvaultError> {
        self.limiter.acquire();
        let Some(quote) = self.provider.fetch_quote(&security.ticker) else {
            return Ok(false);
        };
        self.securities.update_price(&security.ticker, quote.price)?;
        self.upsert_today_bar(&quote, now)?;
        Ok(true)
    }

    fn refresh_overview(&self, security: &Security, now: NaiveDateTime) -> Result<(), QuantvaultError> {
        if !overview_is_stale(security, now) {
            return Ok(());
        }
        self.limiter.acquire();
        if let Some(overview) = self.provider.fetch_company_overview(&security.ticker) {
            self.securities.update_overview(
                &security.ticker,
                overview.beta,
                overview.sector.as_deref(),
                now,
            )?;
        }
        Ok(())
    }

    pub fn refresh_all_prices(&self, now: NaiveDateTime) -> Result<RefreshSummary, QuantvaultError> {
        let mut securities = self.securities.securities()?;
        securities.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        let mut summary = RefreshSummary::default();

        for security in &securities {
            match self.refresh_quote(security, now) {
                Ok(true) => summary.updated_tickers.push(security.ticker.clone()),
                Ok(false) => {
                    warn!(ticker = %security.ticker, "no quote available");
                    summary.failed_tickers.push(security.ticker.clone());
                }
                Err(e) => {
                    warn!(ticker = %security.ticker, error = %e, "quote update failed");
                    summary.failed_tickers.push(security.ticker.clone());
                }
            }
            if let Err(e) = self.refresh_overview(security, now) {
                warn!(ticker = %security.ticker, error = %e, "overview update failed");
            }
        }
        summary.updated_count = summary.updated_tickers.len();
        summary.failed_count = summary.failed_tickers.len();

        // The snapshot reads materialized rows, so they must carry today's prices first.
        recompute_holdings(self.ledger, self.securities, self.holdings, now)?;
        take_snapshot(
            self.ledger,
            self.securities,
            self.holdings,
            self.snapshots,
            now.date(),
        )?;

        let cache = IndicatorCache {
            bars: self.bars,
            store: self.indicators,
        };
        let engine = StrategyEngine {
            strategies: self.strategies,
            signals: self.signals,
            indicators: self.indicators,
        };
        let range = DateRange::trailing(COMPUTE_LOOKBACK_DAYS, now.date());
        for ticker in &summary.updated_tickers {
            if let Err(e) = cache.compute_and_store(ticker, Interval::Daily, range) {
                warn!(ticker = %ticker, error = %e, "indicator recompute failed");
            }
            match engine.generate_and_store_signals(ticker, now) {
                Ok(n) => summary.signals_generated += n,
                Err(e) => warn!(ticker = %ticker, error = %e, "signal generation failed"),
            }
        }

        info!(
            updated = summary.updated_count,
            failed = summary.failed_count,
            signals = summary.signals_generated,
            "price refresh finished"
        );
        Ok(summary)
    }
}

/// Pollable state of the refresh batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshStatus {
    pub running: bool,
    pub last_run_at: Option<NaiveDateTime>,
    pub last_result: Option<RefreshSummary>,
    pub last_error: Option<String>,
}

/// Allows at most one refresh batch in flight per process.
#[derive(Debug, Clone, Default)]
pub struct RefreshCoordinator {
    state: Arc<Mutex<RefreshStatus>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshStatus> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> RefreshStatus {
        self.lock().clone()
    }

    /// Claim the running flag, or fail with `RefreshInProgress`.
    pub fn try_start(&self) -> Result<RefreshTicket, QuantvaultError> {
        let mut state = self.lock();
        if state.running {
            return Err(QuantvaultError::RefreshInProgress);
        }
        state.running = true;
        Ok(RefreshTicket {
            coordinator: self.clone(),
            finished: false,
        })
    }

    /// Claim the flag and run `job` on a background thread. The status is
    /// updated with the outcome when the job returns.
    pub fn spawn<F>(&self, job: F) -> Result<JoinHandle<()>, QuantvaultError>
    where
        F: FnOnce() -> Result<RefreshSummary, QuantvaultError> + Send + 'static,
    {
        let ticket = self.try_start()?;
        let handle = std::thread::Builder::new()
            .name("price-refresh".to_string())
            .spawn(move || ticket.finish(job()))?;
        Ok(handle)
    }
}

/// Proof that the running flag is held. Dropping it without [`finish`](Self::finish)
/// (for instance on panic) releases the flag.
pub struct RefreshTicket {
    coordinator: RefreshCoordinator,
    finished: bool,
}

impl RefreshTicket {
    pub fn finish(mut self, outcome: Result<RefreshSummary, QuantvaultError>) {
        let mut state = self.coordinator.lock();
        state.running = false;
        state.last_run_at = Some(Utc::now().naive_utc());
        match outcome {
            Ok(summary) => {
                state.last_result = Some(summary);
                state.last_error = None;
            }
            Err(e) => {
                warn!(error = %e, "price refresh failed");
                state.last_error = Some(e.to_string());
            }
        }
        self.finished = true;
    }
}

impl Drop for RefreshTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator.lock().running = false;
        }
    }
}
