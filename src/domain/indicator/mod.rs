//! Technical indicator math.
//!
//! Every function takes plain `f64` slices and returns a series of the same
//! length as its input. `None` marks positions where the indicator is not yet
//! defined (insufficient lookback); it is never encoded as a number.
//!
//! - `IndicatorType`: indicator identity + parameters, doubling as the cache key
//! - `Series`: one output series, `Vec<Option<f64>>`

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stddev;

pub use atr::calculate_atr;
pub use bollinger::{calculate_bollinger, BollingerSeries};
pub use ema::calculate_ema;
pub use macd::{calculate_macd, MacdSeries};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;

use crate::domain::error::QuantvaultError;
use std::fmt;
use std::str::FromStr;

pub type Series = Vec<Option<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

impl IndicatorType {
    pub const RSI_14: IndicatorType = IndicatorType::Rsi(14);

    /// The fixed set computed and cached for every ticker.
    pub fn cached_set() -> Vec<IndicatorType> {
        vec![
            IndicatorType::Sma(20),
            IndicatorType::Sma(50),
            IndicatorType::Sma(200),
            IndicatorType::Ema(12),
            IndicatorType::Ema(26),
            IndicatorType::Ema(50),
            IndicatorType::Rsi(14),
            IndicatorType::Macd {
                fast: macd::DEFAULT_FAST,
                slow: macd::DEFAULT_SLOW,
                signal: macd::DEFAULT_SIGNAL,
            },
            IndicatorType::Bollinger {
                period: bollinger::DEFAULT_PERIOD,
                stddev_mult_x100: bollinger::DEFAULT_MULT_X100,
            },
            IndicatorType::Atr(14),
        ]
    }

    /// Storage key, e.g. `SMA_20`, `RSI_14`, `MACD`, `BB_20`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA_{}", period),
            IndicatorType::Ema(period) => write!(f, "EMA_{}", period),
            IndicatorType::Rsi(period) => write!(f, "RSI_{}", period),
            IndicatorType::Atr(period) => write!(f, "ATR_{}", period),
            IndicatorType::Macd { .. } => write!(f, "MACD"),
            IndicatorType::Bollinger { period, .. } => write!(f, "BB_{}", period),
        }
    }
}

impl FromStr for IndicatorType {
    type Err = QuantvaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_uppercase();
        if key == "MACD" {
            return Ok(IndicatorType::Macd {
                fast: macd::DEFAULT_FAST,
                slow: macd::DEFAULT_SLOW,
                signal: macd::DEFAULT_SIGNAL,
            });
        }

        let invalid = || QuantvaultError::invalid_input(format!("unknown indicator type '{s}'"));
        let (name, period) = key.split_once('_').ok_or_else(invalid)?;
        let period: usize = period.parse().map_err(|_| invalid())?;
        if period == 0 {
            return Err(invalid());
        }

        match name {
            "SMA" => Ok(IndicatorType::Sma(period)),
            "EMA" => Ok(IndicatorType::Ema(period)),
            "RSI" => Ok(IndicatorType::Rsi(period)),
            "ATR" => Ok(IndicatorType::Atr(period)),
            "BB" => Ok(IndicatorType::Bollinger {
                period,
                stddev_mult_x100: bollinger::DEFAULT_MULT_X100,
            }),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_keys() {
        assert_eq!(IndicatorType::Sma(20).key(), "SMA_20");
        assert_eq!(IndicatorType::Ema(12).key(), "EMA_12");
        assert_eq!(IndicatorType::RSI_14.key(), "RSI_14");
        assert_eq!(IndicatorType::Atr(14).key(), "ATR_14");
        let macd = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.key(), "MACD");
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.key(), "BB_20");
    }

    #[test]
    fn cached_set_keys_parse_back() {
        for kind in IndicatorType::cached_set() {
            let parsed: IndicatorType = kind.key().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("sma_50".parse::<IndicatorType>().unwrap(), IndicatorType::Sma(50));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("WMA_10".parse::<IndicatorType>().is_err());
        assert!("SMA".parse::<IndicatorType>().is_err());
        assert!("SMA_x".parse::<IndicatorType>().is_err());
        assert!("RSI_0".parse::<IndicatorType>().is_err());
    }

    #[test]
    fn indicator_type_hash_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(IndicatorType::Sma(20), "sma20");
        map.insert(IndicatorType::Sma(50), "sma50");
        assert_eq!(map.get(&IndicatorType::Sma(20)), Some(&"sma20"));
        assert_eq!(map.get(&IndicatorType::Sma(50)), Some(&"sma50"));
        assert_eq!(map.get(&IndicatorType::Sma(200)), None);
    }
}
