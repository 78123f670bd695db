//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation of the same trailing window.
//! Default parameters: period=20, multiplier=2.0

use super::sma::calculate_sma;
use super::stddev::population_stddev_about;
use super::Series;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULT_X100: u32 = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

pub fn calculate_bollinger(prices: &[f64], period: usize, stddev_mult_x100: u32) -> BollingerSeries {
    let mult = stddev_mult_x100 as f64 / 100.0;
    let middle = calculate_sma(prices, period);

    let mut upper: Series = Vec::with_capacity(prices.len());
    let mut lower: Series = Vec::with_capacity(prices.len());

    for (i, mid) in middle.iter().enumerate() {
        match mid {
            Some(mid) => {
                let window = &prices[i + 1 - period..=i];
                let stddev = population_stddev_about(window, *mid);
                upper.push(Some(mid + mult * stddev));
                lower.push(Some(mid - mult * stddev));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    BollingerSeries {
        upper,
        middle,
        lower,
    }
}
