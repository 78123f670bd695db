//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n prices, then
//! EMA[i] = (P[i] - EMA[i-1]) * k + EMA[i-1].
//! Warmup: first (n-1) positions are undefined.

use super::Series;

pub fn calculate_ema(prices: &[f64], period: usize) -> Series {
    if period == 0 || prices.len() < period {
        return vec![None; prices.len()];
    }

    let mut values: Series = Vec::with_capacity(prices.len());
    let k = 2.0 / (period as f64 + 1.0);

    let seed = prices[..period].iter().sum::<f64>() / period as f64;
    values.extend(std::iter::repeat_n(None, period - 1));
    values.push(Some(seed));

    let mut ema = seed;
    for &price in &prices[period..] {
        ema = (price - ema) * k + ema;
        values.push(Some(ema));
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::sma::calculate_sma;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn ema_warmup() {
        let series = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);

        assert!(series[0].is_none());
        assert!(series[1].is_none());
        assert!(series[2].is_some());
        assert!(series[3].is_some());
        assert!(series[4].is_some());
    }

    #[test]
    fn ema_period_1() {
        let series = calculate_ema(&[10.0, 20.0, 30.0], 1);
        assert_eq!(series, vec![Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn ema_seed_is_sma() {
        let series = calculate_ema(&[10.0, 20.0, 30.0], 3);
        assert_relative_eq!(series[2].unwrap(), 20.0);
    }

    #[test]
    fn ema_recursive_calculation() {
        let series = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);

        let k = 2.0 / 4.0;
        let sma = 20.0;
        let ema_3 = (40.0 - sma) * k + sma;
        let ema_4 = (50.0 - ema_3) * k + ema_3;

        assert_relative_eq!(series[3].unwrap(), ema_3);
        assert_relative_eq!(series[4].unwrap(), ema_4);
    }

    #[test]
    fn ema_equal_prices() {
        let series = calculate_ema(&[100.0; 5], 3);
        for value in series.iter().flatten() {
            assert_relative_eq!(*value, 100.0);
        }
    }

    #[test]
    fn ema_insufficient_prices() {
        assert_eq!(calculate_ema(&[1.0, 2.0], 3), vec![None, None]);
    }

    #[test]
    fn ema_period_0() {
        assert_eq!(calculate_ema(&[10.0, 20.0], 0), vec![None, None]);
    }

    proptest! {
        #[test]
        fn ema_and_sma_agree_at_seed(
            prices in proptest::collection::vec(1.0f64..500.0, 1..80),
            period in 1usize..40,
        ) {
            prop_assume!(period <= prices.len());
            let ema = calculate_ema(&prices, period);
            let sma = calculate_sma(&prices, period);
            prop_assert_eq!(ema[period - 1], sma[period - 1]);
        }
    }
}
