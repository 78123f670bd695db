//! Ledger records and per-ticker position aggregation.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use super::error::QuantvaultError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = QuantvaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(QuantvaultError::invalid_input(format!(
                "unknown trade side '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Active,
    Rejected,
    Deleted,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Active => "ACTIVE",
            TradeStatus::Rejected => "REJECTED",
            TradeStatus::Deleted => "DELETED",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = QuantvaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(TradeStatus::Active),
            "REJECTED" => Ok(TradeStatus::Rejected),
            "DELETED" => Ok(TradeStatus::Deleted),
            other => Err(QuantvaultError::invalid_input(format!(
                "unknown trade status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub id: i64,
    pub ticker: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub status: TradeStatus,
}

/// Security reference data as seen by the analytics core.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Security {
    pub ticker: String,
    pub name: String,
    pub price: f64,
    pub sector: Option<String>,
    pub beta: Option<f64>,
    pub overview_updated_at: Option<NaiveDateTime>,
}

/// Aggregate of all active trades in one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub ticker: String,
    pub net_quantity: f64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub unrealized_pnl: f64,
}

impl Position {
    /// `None` when the cost basis is zero.
    pub fn unrealized_pnl_pct(&self) -> Option<f64> {
        pnl_pct(self.unrealized_pnl, self.cost_basis)
    }
}

pub fn pnl_pct(pnl: f64, cost_basis: f64) -> Option<f64> {
    if cost_basis == 0.0 {
        None
    } else {
        Some(pnl / cost_basis * 100.0)
    }
}

#[derive(Debug, Default)]
struct TickerTotals {
    buy_qty: f64,
    buy_cost: f64,
    sell_qty: f64,
}

/// Group active trades by ticker and value each group at `prices`.
///
/// Non-active trades are ignored. A ticker missing from `prices` is valued at 0.
/// The result is ordered by descending absolute market value, ties by ticker.
pub fn aggregate_positions(trades: &[Trade], prices: &HashMap<String, f64>) -> Vec<Position> {
    let mut totals: BTreeMap<&str, TickerTotals> = BTreeMap::new();
    for trade in trades.iter().filter(|t| t.status == TradeStatus::Active) {
        let entry = totals.entry(trade.ticker.as_str()).or_default();
        match trade.side {
            TradeSide::Buy => {
                entry.buy_qty += trade.quantity;
                entry.buy_cost += trade.quantity * trade.price;
            }
            TradeSide::Sell => entry.sell_qty += trade.quantity,
        }
    }

    let mut positions: Vec<Position> = totals
        .into_iter()
        .map(|(ticker, t)| {
            let net_quantity = t.buy_qty - t.sell_qty;
            let avg_cost = if t.buy_qty != 0.0 {
                t.buy_cost / t.buy_qty
            } else {
                0.0
            };
            let current_price = prices.get(ticker).copied().unwrap_or(0.0);
            let market_value = net_quantity * current_price;
            let cost_basis = net_quantity * avg_cost;
            Position {
                ticker: ticker.to_string(),
                net_quantity,
                avg_cost,
                current_price,
                market_value,
                cost_basis,
                unrealized_pnl: market_value - cost_basis,
            }
        })
        .collect();

    sort_by_exposure(&mut positions, |p| (p.market_value, p.ticker.as_str()));
    positions
}

/// Descending absolute market value, ties broken by ticker ascending.
pub fn sort_by_exposure<T>(items: &mut [T], key: impl Fn(&T) -> (f64, &str)) {
    items.sort_by(|a, b| {
        let (mv_a, t_a) = key(a);
        let (mv_b, t_b) = key(b);
        mv_b.abs()
            .total_cmp(&mv_a.abs())
            .then_with(|| t_a.cmp(t_b))
    });
}
