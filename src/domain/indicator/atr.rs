//! Average True Range.
//!
//! TR[i] = max(H[i] - L[i], |H[i] - C[i-1]|, |L[i] - C[i-1]|) for i >= 1.
//! ATR = SMA(n) of the TR series, shifted right by one position so it lines
//! up with the input index. Needs n+1 bars.

use super::sma::calculate_sma;
use super::Series;
use crate::domain::ohlcv::true_range;

pub const DEFAULT_PERIOD: usize = 14;

pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Series {
    let len = highs.len();
    if lows.len() != len || closes.len() != len || period == 0 || len < period + 1 {
        return vec![None; len];
    }

    let true_ranges: Vec<f64> = (1..len)
        .map(|i| true_range(highs[i], lows[i], closes[i - 1]))
        .collect();

    let mut values: Series = Vec::with_capacity(len);
    values.push(None);
    values.extend(calculate_sma(&true_ranges, period));
    values
}
