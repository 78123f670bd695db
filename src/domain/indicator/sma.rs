//! Simple Moving Average.
//!
//! SMA(n)[i] = mean(P[i-n+1..=i]). First (n-1) positions undefined; every
//! position undefined when fewer than n prices are available.

use super::Series;

pub fn calculate_sma(prices: &[f64], period: usize) -> Series {
    if period == 0 || prices.len() < period {
        return vec![None; prices.len()];
    }

    let mut values: Series = vec![None; period - 1];
    values.reserve(prices.len() + 1 - period);

    for window in prices.windows(period) {
        values.push(Some(window.iter().sum::<f64>() / period as f64));
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn sma_warmup() {
        let series = calculate_sma(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert_eq!(series.len(), 5);
        assert!(series[0].is_none());
        assert!(series[1].is_none());
        assert_relative_eq!(series[2].unwrap(), 20.0);
        assert_relative_eq!(series[3].unwrap(), 30.0);
        assert_relative_eq!(series[4].unwrap(), 40.0);
    }

    #[test]
    fn sma_short_input_is_all_undefined() {
        let series = calculate_sma(&[1.0, 2.0], 3);
        assert_eq!(series, vec![None, None]);
    }

    #[test]
    fn sma_period_0() {
        assert_eq!(calculate_sma(&[1.0, 2.0], 0), vec![None, None]);
    }

    #[test]
    fn sma_empty() {
        assert!(calculate_sma(&[], 5).is_empty());
    }

    #[test]
    fn sma_period_1_is_identity() {
        let prices = [3.0, 1.0, 4.0];
        let series = calculate_sma(&prices, 1);
        assert_eq!(series, vec![Some(3.0), Some(1.0), Some(4.0)]);
    }

    proptest! {
        #[test]
        fn sma_of_constant_is_constant(v in 0.01f64..10_000.0, len in 1usize..120, period in 1usize..120) {
            prop_assume!(period <= len);
            let prices = vec![v; len];
            let series = calculate_sma(&prices, period);
            prop_assert_eq!(series.len(), len);
            for value in series.iter().flatten() {
                prop_assert!((value - v).abs() <= v * 1e-12);
            }
            prop_assert_eq!(series.iter().filter(|x| x.is_some()).count(), len - period + 1);
        }

        #[test]
        fn sma_short_series_never_defined(len in 0usize..20, extra in 1usize..10) {
            let prices: Vec<f64> = (0..len).map(|i| i as f64).collect();
            let series = calculate_sma(&prices, len + extra);
            prop_assert!(series.iter().all(|x| x.is_none()));
        }
    }
}
