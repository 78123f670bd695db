//! Portfolio risk analytics.
//!
//! Every statistic that needs a minimum amount of history returns `None` when
//! that history is missing. `None` means "not computable yet", never zero.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::error::QuantvaultError;
use super::holdings::current_holdings;
use super::indicator::stddev::mean_and_stddev;
use super::ohlcv::{normalize_ticker, PriceBar};
use super::portfolio::PortfolioSnapshot;
use super::position::{Position, Security, TradeSide};
use crate::ports::data_port::PriceBarPort;
use crate::ports::holdings_port::{HoldingsPort, SnapshotPort};
use crate::ports::ledger_port::{SecurityPort, TradeLedgerPort};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const VAR_LOOKBACK_DAYS: i64 = 365;
pub const MIN_VAR_RETURNS: usize = 30;

pub const HIGH_CONCENTRATION_HHI: f64 = 0.25;
pub const MODERATE_CONCENTRATION_HHI: f64 = 0.15;

pub const POSITION_SIZE_LIMIT_PCT: f64 = 25.0;
pub const SECTOR_CONCENTRATION_LIMIT_PCT: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConcentrationRating {
    Low,
    Moderate,
    High,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl ConcentrationRating {
    /// Shared HHI bands for position-level and portfolio-level classification.
    pub fn from_hhi(hhi: f64) -> Self {
        if hhi > HIGH_CONCENTRATION_HHI {
            ConcentrationRating::High
        } else if hhi > MODERATE_CONCENTRATION_HHI {
            ConcentrationRating::Moderate
        } else {
            ConcentrationRating::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConcentrationRating::Low => "Low",
            ConcentrationRating::Moderate => "Moderate",
            ConcentrationRating::High => "High",
            ConcentrationRating::NotApplicable => "N/A",
        }
    }
}

impl fmt::Display for ConcentrationRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Concentration {
    pub hhi: f64,
    pub concentration_rating: ConcentrationRating,
    pub top_position_pct: f64,
    pub top_5_positions_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drawdown {
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub peak_date: NaiveDate,
    pub trough_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorWeight {
    pub market_value: f64,
    pub weight_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub portfolio_beta: f64,
    pub var_95: Option<f64>,
    pub var_99: Option<f64>,
    pub max_drawdown: Option<Drawdown>,
    pub sharpe_ratio: Option<f64>,
    pub concentration: Concentration,
    pub sector_allocation: BTreeMap<String, SectorWeight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskSeverity {
    #[serde(rename = "warning")]
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskWarning {
    pub severity: RiskSeverity,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposedTrade {
    pub ticker: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
}

/// Market-value-weighted beta. Positions without a beta contribute nothing.
pub fn portfolio_beta(positions: &[Position], betas: &HashMap<String, f64>) -> f64 {
    let total: f64 = positions.iter().map(|p| p.market_value).sum();
    if total == 0.0 {
        return 0.0;
    }
    positions
        .iter()
        .filter(|p| p.market_value != 0.0)
        .filter_map(|p| betas.get(&p.ticker).map(|b| b * p.market_value / total))
        .sum()
}

/// Simple daily returns from closes, computed within each ticker and pooled.
///
/// `bars` must be ordered by ticker then timestamp. Steps whose previous close
/// is not positive are skipped.
pub fn pooled_daily_returns(bars: &[PriceBar]) -> Vec<f64> {
    bars.windows(2)
        .filter(|w| w[0].ticker == w[1].ticker && w[0].close > 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect()
}

/// Empirical VaR at `confidence`, as a positive fraction of value.
pub fn historical_var(returns: &[f64], confidence: f64) -> Option<f64> {
    if returns.len() < MIN_VAR_RETURNS {
        return None;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    let index = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    Some(sorted[index].abs())
}

pub fn max_drawdown(snapshots: &[PortfolioSnapshot]) -> Option<Drawdown> {
    let first = snapshots.first()?;
    if snapshots.len() < 2 {
        return None;
    }

    let mut peak = first.total_market_value;
    let mut peak_date = first.snapshot_date;
    let mut result = Drawdown {
        max_drawdown: 0.0,
        max_drawdown_pct: 0.0,
        peak_date,
        trough_date: None,
    };

    for snap in snapshots {
        if snap.total_market_value > peak {
            peak = snap.total_market_value;
            peak_date = snap.snapshot_date;
        }
        let drawdown = peak - snap.total_market_value;
        if drawdown > result.max_drawdown {
            result.max_drawdown = drawdown;
            result.max_drawdown_pct = if peak > 0.0 {
                drawdown / peak * 100.0
            } else {
                0.0
            };
            result.peak_date = peak_date;
            result.trough_date = Some(snap.snapshot_date);
        }
    }

    Some(result)
}

/// Annualized Sharpe ratio over daily snapshot returns.
pub fn sharpe_ratio(snapshots: &[PortfolioSnapshot], risk_free_rate: f64) -> Option<f64> {
    let returns: Vec<f64> = snapshots
        .windows(2)
        .filter(|w| w[0].total_market_value > 0.0)
        .map(|w| (w[1].total_market_value - w[0].total_market_value) / w[0].total_market_value)
        .collect();
    if returns.len() < 2 {
        return None;
    }

    let (mean, stddev) = mean_and_stddev(&returns)?;
    if stddev == 0.0 {
        return None;
    }
    let annual_return = mean * TRADING_DAYS_PER_YEAR;
    let annual_std = stddev * TRADING_DAYS_PER_YEAR.sqrt();
    Some((annual_return - risk_free_rate) / annual_std)
}

pub fn concentration(positions: &[Position]) -> Concentration {
    let total: f64 = positions.iter().map(|p| p.market_value).sum();
    if total == 0.0 {
        return Concentration {
            hhi: 0.0,
            concentration_rating: ConcentrationRating::NotApplicable,
            top_position_pct: 0.0,
            top_5_positions_pct: 0.0,
        };
    }

    let mut weights: Vec<f64> = positions
        .iter()
        .filter(|p| p.market_value > 0.0)
        .map(|p| p.market_value / total)
        .collect();
    weights.sort_by(|a, b| b.total_cmp(a));

    let hhi: f64 = weights.iter().map(|w| w * w).sum();
    Concentration {
        hhi,
        concentration_rating: ConcentrationRating::from_hhi(hhi),
        top_position_pct: weights.first().map_or(0.0, |w| w * 100.0),
        top_5_positions_pct: weights.iter().take(5).sum::<f64>() * 100.0,
    }
}

/// Market value and weight per sector; positions without a sector go under "Unknown".
pub fn sector_allocation(
    positions: &[Position],
    sectors: &HashMap<String, String>,
) -> BTreeMap<String, SectorWeight> {
    let total: f64 = positions.iter().map(|p| p.market_value).sum();
    let mut allocation: BTreeMap<String, SectorWeight> = BTreeMap::new();
    for p in positions.iter().filter(|p| p.net_quantity != 0.0) {
        let sector = sectors
            .get(&p.ticker)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let entry = allocation.entry(sector).or_insert(SectorWeight {
            market_value: 0.0,
            weight_pct: 0.0,
        });
        entry.market_value += p.market_value;
    }
    for weight in allocation.values_mut() {
        weight.weight_pct = if total != 0.0 {
            weight.market_value / total * 100.0
        } else {
            0.0
        };
    }
    allocation
}

/// Advisory checks for a proposed trade. Never blocks; an empty list means no issue.
pub fn check_trade_risk(
    positions: &[Position],
    securities: &[Security],
    trade: &ProposedTrade,
) -> Vec<RiskWarning> {
    let mut warnings = Vec::new();
    let ticker = normalize_ticker(&trade.ticker);
    let total: f64 = positions.iter().map(|p| p.market_value).sum();
    let trade_value = trade.quantity * trade.price;
    let is_buy = trade.side == TradeSide::Buy;

    if is_buy && total > 0.0 {
        let current = positions
            .iter()
            .find(|p| p.ticker == ticker)
            .map_or(0.0, |p| p.market_value);
        let new_weight = (current + trade_value) / (total + trade_value) * 100.0;
        if new_weight > POSITION_SIZE_LIMIT_PCT {
            warnings.push(RiskWarning {
                severity: RiskSeverity::Warning,
                code: "POSITION_SIZE_LIMIT",
                message: format!(
                    "Trade would result in {:.2}% position size (limit: {}%)",
                    new_weight, POSITION_SIZE_LIMIT_PCT
                ),
            });
        }
    }

    let sector_of: HashMap<&str, &str> = securities
        .iter()
        .filter_map(|s| s.sector.as_deref().map(|sec| (s.ticker.as_str(), sec)))
        .collect();

    if let Some(&sector) = sector_of.get(ticker.as_str()) {
        if total > 0.0 {
            let mut sector_value: f64 = positions
                .iter()
                .filter(|p| sector_of.get(p.ticker.as_str()) == Some(&sector))
                .map(|p| p.market_value)
                .sum();
            let mut denominator = total;
            if is_buy {
                sector_value += trade_value;
                denominator += trade_value;
            }
            let sector_weight = sector_value / denominator * 100.0;
            if sector_weight > SECTOR_CONCENTRATION_LIMIT_PCT {
                warnings.push(RiskWarning {
                    severity: RiskSeverity::Warning,
                    code: "SECTOR_CONCENTRATION",
                    message: format!(
                        "Trade would result in {:.2}% sector concentration (limit: {}%)",
                        sector_weight, SECTOR_CONCENTRATION_LIMIT_PCT
                    ),
                });
            }
        }
    }

    warnings
}

/// Risk statistics over the stores, read-only.
pub struct RiskEngine<'a> {
    pub bars: &'a dyn PriceBarPort,
    pub ledger: &'a dyn TradeLedgerPort,
    pub securities: &'a dyn SecurityPort,
    pub holdings: &'a dyn HoldingsPort,
    pub snapshots: &'a dyn SnapshotPort,
    pub risk_free_rate: f64,
}

impl RiskEngine<'_> {
    /// VaR over the trailing year of daily closes ending at `as_of`, for one
    /// ticker or the whole bar store.
    pub fn compute_var(
        &self,
        ticker: Option<&str>,
        confidence: f64,
        as_of: NaiveDate,
    ) -> Result<Option<f64>, QuantvaultError> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(QuantvaultError::invalid_input(format!(
                "confidence level must be in (0, 1), got {}",
                confidence
            )));
        }
        let ticker = ticker.map(normalize_ticker);
        let start = as_of - Duration::days(VAR_LOOKBACK_DAYS);
        let bars = self
            .bars
            .fetch_daily_bars(ticker.as_deref(), start, as_of)?;
        let returns = pooled_daily_returns(&bars);
        let var = historical_var(&returns, confidence);
        if var.is_none() {
            tracing::debug!(
                returns = returns.len(),
                "not enough return observations for VaR"
            );
        }
        Ok(var)
    }

    pub fn compute_max_drawdown(&self) -> Result<Option<Drawdown>, QuantvaultError> {
        Ok(max_drawdown(&self.snapshots.snapshots()?))
    }

    pub fn compute_sharpe_ratio(&self) -> Result<Option<f64>, QuantvaultError> {
        Ok(sharpe_ratio(&self.snapshots.snapshots()?, self.risk_free_rate))
    }

    pub fn compute_risk_metrics(&self, as_of: NaiveDate) -> Result<RiskMetrics, QuantvaultError> {
        let positions = current_holdings(self.ledger, self.securities, self.holdings)?;
        let securities = self.securities.securities()?;
        let betas: HashMap<String, f64> = securities
            .iter()
            .filter_map(|s| s.beta.map(|b| (s.ticker.clone(), b)))
            .collect();
        let sectors: HashMap<String, String> = securities
            .iter()
            .filter_map(|s| s.sector.clone().map(|sec| (s.ticker.clone(), sec)))
            .collect();
        let snapshots = self.snapshots.snapshots()?;

        Ok(RiskMetrics {
            portfolio_beta: portfolio_beta(&positions, &betas),
            var_95: self.compute_var(None, 0.95, as_of)?,
            var_99: self.compute_var(None, 0.99, as_of)?,
            max_drawdown: max_drawdown(&snapshots),
            sharpe_ratio: sharpe_ratio(&snapshots, self.risk_free_rate),
            concentration: concentration(&positions),
            sector_allocation: sector_allocation(&positions, &sectors),
        })
    }

    pub fn check_trade_risk(
        &self,
        trade: &ProposedTrade,
    ) -> Result<Vec<RiskWarning>, QuantvaultError> {
        let positions = current_holdings(self.ledger, self.securities, self.holdings)?;
        let securities = self.securities.securities()?;
        Ok(check_trade_risk(&positions, &securities, trade))
    }
}
