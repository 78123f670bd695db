//! Portfolio performance and daily snapshots.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::error::QuantvaultError;
use super::holdings::{current_holdings, totals, HoldingsTotals};
use super::position::Position;
use crate::ports::holdings_port::{HoldingsPort, SnapshotPort};
use crate::ports::ledger_port::{SecurityPort, TradeLedgerPort};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownEntry {
    pub ticker: String,
    pub net_quantity: f64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub pnl: f64,
    pub pnl_pct: Option<f64>,
}

impl From<&Position> for BreakdownEntry {
    fn from(p: &Position) -> Self {
        BreakdownEntry {
            ticker: p.ticker.clone(),
            net_quantity: p.net_quantity,
            avg_cost: p.avg_cost,
            current_price: p.current_price,
            market_value: p.market_value,
            cost_basis: p.cost_basis,
            pnl: p.unrealized_pnl,
            pnl_pct: p.unrealized_pnl_pct(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioPerformance {
    #[serde(flatten)]
    pub totals: HoldingsTotals,
    pub breakdown: Vec<BreakdownEntry>,
}

impl PortfolioPerformance {
    pub fn from_positions(positions: &[Position]) -> Self {
        PortfolioPerformance {
            totals: totals(positions),
            breakdown: positions.iter().map(BreakdownEntry::from).collect(),
        }
    }
}

/// One row per calendar day of portfolio totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub snapshot_date: NaiveDate,
    pub total_market_value: f64,
    pub total_cost_basis: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: Option<f64>,
    pub breakdown: serde_json::Value,
}

impl PortfolioSnapshot {
    pub fn from_performance(
        snapshot_date: NaiveDate,
        performance: &PortfolioPerformance,
    ) -> Result<Self, QuantvaultError> {
        Ok(PortfolioSnapshot {
            snapshot_date,
            total_market_value: performance.totals.total_market_value,
            total_cost_basis: performance.totals.total_cost_basis,
            total_pnl: performance.totals.total_pnl,
            total_pnl_pct: performance.totals.total_pnl_pct,
            breakdown: serde_json::to_value(&performance.breakdown)?,
        })
    }
}

pub fn portfolio_performance(
    ledger: &dyn TradeLedgerPort,
    securities: &dyn SecurityPort,
    holdings: &dyn HoldingsPort,
) -> Result<PortfolioPerformance, QuantvaultError> {
    let positions = current_holdings(ledger, securities, holdings)?;
    Ok(PortfolioPerformance::from_positions(&positions))
}

/// Upsert the snapshot for `date` from current portfolio performance.
pub fn take_snapshot(
    ledger: &dyn TradeLedgerPort,
    securities: &dyn SecurityPort,
    holdings: &dyn HoldingsPort,
    snapshots: &dyn SnapshotPort,
    date: NaiveDate,
) -> Result<PortfolioSnapshot, QuantvaultError> {
    let performance = portfolio_performance(ledger, securities, holdings)?;
    let snapshot = PortfolioSnapshot::from_performance(date, &performance)?;
    snapshots.upsert_snapshot(&snapshot)?;
    info!(
        date = %date,
        total_market_value = snapshot.total_market_value,
        "portfolio snapshot saved"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn position(ticker: &str, qty: f64, avg: f64, price: f64) -> Position {
        Position {
            ticker: ticker.to_string(),
            net_quantity: qty,
            avg_cost: avg,
            current_price: price,
            market_value: qty * price,
            cost_basis: qty * avg,
            unrealized_pnl: qty * (price - avg),
        }
    }

    #[test]
    fn performance_totals_and_breakdown() {
        let perf = PortfolioPerformance::from_positions(&[
            position("AAPL", 10.0, 100.0, 120.0),
            position("MSFT", 5.0, 200.0, 180.0),
        ]);
        assert_relative_eq!(perf.totals.total_market_value, 2100.0);
        assert_relative_eq!(perf.totals.total_cost_basis, 2000.0);
        assert_relative_eq!(perf.totals.total_pnl, 100.0);
        assert_relative_eq!(perf.totals.total_pnl_pct.unwrap(), 5.0);
        assert_eq!(perf.breakdown.len(), 2);
        assert_relative_eq!(perf.breakdown[1].pnl_pct.unwrap(), -10.0);
    }

    #[test]
    fn snapshot_serializes_breakdown() {
        let perf = PortfolioPerformance::from_positions(&[position("AAPL", 1.0, 10.0, 12.0)]);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let snap = PortfolioSnapshot::from_performance(date, &perf).unwrap();
        assert_eq!(snap.snapshot_date, date);
        assert_eq!(snap.breakdown[0]["ticker"], "AAPL");
        assert_eq!(snap.breakdown[0]["market_value"], 12.0);
    }

    #[test]
    fn empty_portfolio_snapshot() {
        let perf = PortfolioPerformance::from_positions(&[]);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let snap = PortfolioSnapshot::from_performance(date, &perf).unwrap();
        assert_eq!(snap.total_market_value, 0.0);
        assert!(snap.total_pnl_pct.is_none());
        assert_eq!(snap.breakdown, serde_json::json!([]));
    }
}
