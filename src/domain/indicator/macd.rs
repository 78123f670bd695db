//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow), defined where both EMAs are defined
//! Signal Line = EMA(signal) over the defined part of the MACD line, mapped back
//! Histogram = MACD Line - Signal Line, defined where both are defined
//!
//! Default parameters: fast=12, slow=26, signal=9

use super::ema::calculate_ema;
use super::Series;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn calculate_macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> MacdSeries {
    let ema_fast = calculate_ema(prices, fast);
    let ema_slow = calculate_ema(prices, slow);

    let line: Series = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let defined: Vec<f64> = line.iter().flatten().copied().collect();
    let mut signal: Series = vec![None; prices.len()];
    if signal_period > 0 && defined.len() >= signal_period {
        let signal_raw = calculate_ema(&defined, signal_period);
        let mut raw = signal_raw.into_iter();
        for (slot, macd) in signal.iter_mut().zip(&line) {
            if macd.is_some() {
                *slot = raw.next().flatten();
            }
        }
    }

    let histogram: Series = line
        .iter()
        .zip(&signal)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();

    MacdSeries {
        line,
        signal,
        histogram,
    }
}
