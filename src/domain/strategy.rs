//! Strategy records, signals and the rules that turn indicator values into signals.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::str::FromStr;

use super::error::QuantvaultError;
use super::indicator::IndicatorType;

pub const DEFAULT_OVERSOLD: f64 = 30.0;
pub const DEFAULT_OVERBOUGHT: f64 = 70.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStrategy {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub is_active: bool,
}

/// Partial update; `None` fields are left unchanged. `description:
/// Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub parameters: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

impl StrategyUpdate {
    pub fn set_active(is_active: bool) -> Self {
        StrategyUpdate {
            is_active: Some(is_active),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
    Alert,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Hold => "HOLD",
            SignalType::Alert => "ALERT",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = QuantvaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(SignalType::Buy),
            "SELL" => Ok(SignalType::Sell),
            "HOLD" => Ok(SignalType::Hold),
            "ALERT" => Ok(SignalType::Alert),
            other => Err(QuantvaultError::invalid_input(format!(
                "unknown signal type '{}'",
                other
            ))),
        }
    }
}

/// A signal a strategy would emit now, before it is stamped and stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalCandidate {
    pub strategy_id: i64,
    pub ticker: String,
    pub signal_type: SignalType,
    pub strength: f64,
    pub value: Option<f64>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub id: Option<i64>,
    pub strategy_id: i64,
    pub ticker: String,
    pub signal_type: SignalType,
    pub strength: f64,
    pub value: Option<f64>,
    pub metadata: serde_json::Value,
    pub timestamp: NaiveDateTime,
}

impl Signal {
    pub fn from_candidate(candidate: SignalCandidate, timestamp: NaiveDateTime) -> Self {
        Signal {
            id: None,
            strategy_id: candidate.strategy_id,
            ticker: candidate.ticker,
            signal_type: candidate.signal_type,
            strength: candidate.strength,
            value: candidate.value,
            metadata: candidate.metadata,
            timestamp,
        }
    }

    /// Calendar day used for the one-signal-per-day rule.
    pub fn signal_day(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalFilter {
    pub ticker: Option<String>,
    pub strategy_id: Option<i64>,
    pub limit: usize,
}

impl Default for SignalFilter {
    fn default() -> Self {
        SignalFilter {
            ticker: None,
            strategy_id: None,
            limit: 100,
        }
    }
}

/// Evaluation rule a strategy is routed to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrategyRule {
    /// BUY below `oversold`, SELL above `overbought`, on the latest RSI(14).
    RsiMeanReversion { oversold: f64, overbought: f64 },
}

impl StrategyRule {
    /// Route by name; `None` when no rule understands the strategy.
    pub fn for_strategy(strategy: &Strategy) -> Option<Self> {
        let name = strategy.name.to_uppercase();
        if name.contains("RSI") || name.contains("MEAN_REVERSION") {
            let param = |key: &str, default: f64| {
                strategy
                    .parameters
                    .as_ref()
                    .and_then(|p| p.get(key))
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(default)
            };
            return Some(StrategyRule::RsiMeanReversion {
                oversold: param("oversold", DEFAULT_OVERSOLD),
                overbought: param("overbought", DEFAULT_OVERBOUGHT),
            });
        }
        None
    }

    /// The cached indicator this rule reads.
    pub fn indicator(&self) -> IndicatorType {
        match self {
            StrategyRule::RsiMeanReversion { .. } => IndicatorType::RSI_14,
        }
    }

    /// Signal type, strength in [0, 1] and metadata for one indicator reading.
    pub fn evaluate(&self, value: f64) -> Option<(SignalType, f64, serde_json::Value)> {
        match *self {
            StrategyRule::RsiMeanReversion {
                oversold,
                overbought,
            } => {
                let metadata = json!({
                    "indicator": self.indicator().key(),
                    "threshold_buy": oversold,
                    "threshold_sell": overbought,
                });
                if value < oversold {
                    let strength = ((oversold - value) / 30.0).min(1.0);
                    Some((SignalType::Buy, strength, metadata))
                } else if value > overbought {
                    let strength = ((value - overbought) / 30.0).min(1.0);
                    Some((SignalType::Sell, strength, metadata))
                } else {
                    None
                }
            }
        }
    }
}
