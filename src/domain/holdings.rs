//! Holdings aggregation and its materialized cache.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::error::QuantvaultError;
use super::position::{aggregate_positions, pnl_pct, sort_by_exposure, Position};
use crate::ports::holdings_port::HoldingsPort;
use crate::ports::ledger_port::{SecurityPort, TradeLedgerPort};

/// One row of the materialized holdings table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializedHolding {
    pub ticker: String,
    pub net_quantity: f64,
    pub average_cost: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: Option<f64>,
    pub last_updated: NaiveDateTime,
}

impl MaterializedHolding {
    pub fn from_position(position: &Position, last_updated: NaiveDateTime) -> Self {
        MaterializedHolding {
            ticker: position.ticker.clone(),
            net_quantity: position.net_quantity,
            average_cost: position.avg_cost,
            market_value: position.market_value,
            cost_basis: position.cost_basis,
            unrealized_pnl: position.unrealized_pnl,
            unrealized_pnl_pct: position.unrealized_pnl_pct(),
            last_updated,
        }
    }
}

fn price_map(securities: &dyn SecurityPort) -> Result<HashMap<String, f64>, QuantvaultError> {
    Ok(securities
        .securities()?
        .into_iter()
        .map(|s| (s.ticker, s.price))
        .collect())
}

/// Aggregate the trade ledger into positions valued at current security prices.
pub fn compute_holdings(
    ledger: &dyn TradeLedgerPort,
    securities: &dyn SecurityPort,
) -> Result<Vec<Position>, QuantvaultError> {
    let trades = ledger.active_trades()?;
    let prices = price_map(securities)?;
    let positions = aggregate_positions(&trades, &prices);
    debug!(
        trades = trades.len(),
        positions = positions.len(),
        "computed holdings from ledger"
    );
    Ok(positions)
}

/// Recompute holdings and fully replace the materialized table.
///
/// Must run after every trade mutation and after a price refresh. Running it
/// twice with the same ledger and `computed_at` leaves identical rows.
pub fn recompute_holdings(
    ledger: &dyn TradeLedgerPort,
    securities: &dyn SecurityPort,
    store: &dyn HoldingsPort,
    computed_at: NaiveDateTime,
) -> Result<Vec<MaterializedHolding>, QuantvaultError> {
    let positions = compute_holdings(ledger, securities)?;
    let rows: Vec<MaterializedHolding> = positions
        .iter()
        .map(|p| MaterializedHolding::from_position(p, computed_at))
        .collect();
    store.replace_materialized(&rows, computed_at)?;
    info!(holdings = rows.len(), "recomputed and materialized holdings");
    Ok(rows)
}

/// Read materialized holdings, re-reading current prices from the security
/// records. `None` means the table has never been computed.
///
/// Only `current_price` is refreshed. Market value, cost basis and unrealized
/// P&L are the values stored at the last recompute, so after a price update
/// they lag until `recompute_holdings` runs again.
pub fn get_holdings_from_materialized(
    store: &dyn HoldingsPort,
    securities: &dyn SecurityPort,
) -> Result<Option<Vec<Position>>, QuantvaultError> {
    let Some(rows) = store.load_materialized()? else {
        return Ok(None);
    };
    let prices = price_map(securities)?;

    let mut positions: Vec<Position> = rows
        .into_iter()
        .map(|row| Position {
            current_price: prices.get(&row.ticker).copied().unwrap_or(0.0),
            ticker: row.ticker,
            net_quantity: row.net_quantity,
            avg_cost: row.average_cost,
            market_value: row.market_value,
            cost_basis: row.cost_basis,
            unrealized_pnl: row.unrealized_pnl,
        })
        .collect();
    sort_by_exposure(&mut positions, |p| (p.market_value, p.ticker.as_str()));
    Ok(Some(positions))
}

/// Materialized holdings when they exist, otherwise a live computation.
pub fn current_holdings(
    ledger: &dyn TradeLedgerPort,
    securities: &dyn SecurityPort,
    store: &dyn HoldingsPort,
) -> Result<Vec<Position>, QuantvaultError> {
    match get_holdings_from_materialized(store, securities)? {
        Some(positions) => Ok(positions),
        None => compute_holdings(ledger, securities),
    }
}

/// Portfolio totals over a set of positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingsTotals {
    pub total_market_value: f64,
    pub total_cost_basis: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: Option<f64>,
}

pub fn totals(positions: &[Position]) -> HoldingsTotals {
    let total_market_value: f64 = positions.iter().map(|p| p.market_value).sum();
    let total_cost_basis: f64 = positions.iter().map(|p| p.cost_basis).sum();
    let total_pnl = total_market_value - total_cost_basis;
    HoldingsTotals {
        total_market_value,
        total_cost_basis,
        total_pnl,
        total_pnl_pct: pnl_pct(total_pnl, total_cost_basis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn position(ticker: &str, mv: f64, cost: f64) -> Position {
        Position {
            ticker: ticker.to_string(),
            net_quantity: 1.0,
            avg_cost: cost,
            current_price: mv,
            market_value: mv,
            cost_basis: cost,
            unrealized_pnl: mv - cost,
        }
    }

    #[test]
    fn materialized_row_carries_pnl_pct() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let row = MaterializedHolding::from_position(&position("AAPL", 110.0, 100.0), at);
        assert_relative_eq!(row.unrealized_pnl_pct.unwrap(), 10.0);
        assert_eq!(row.last_updated, at);

        let flat = MaterializedHolding::from_position(&position("X", 0.0, 0.0), at);
        assert!(flat.unrealized_pnl_pct.is_none());
    }

    #[test]
    fn totals_sum_positions() {
        let t = totals(&[position("A", 150.0, 100.0), position("B", 50.0, 100.0)]);
        assert_relative_eq!(t.total_market_value, 200.0);
        assert_relative_eq!(t.total_cost_basis, 200.0);
        assert_relative_eq!(t.total_pnl, 0.0);
        assert_relative_eq!(t.total_pnl_pct.unwrap(), 0.0);
    }

    #[test]
    fn totals_of_empty_portfolio_has_no_pct() {
        let t = totals(&[]);
        assert_eq!(t.total_market_value, 0.0);
        assert!(t.total_pnl_pct.is_none());
    }
}
