//! Average True Range.
//!
//! TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|); the first bar uses H-L.
//! ATR(n) = span-n exponentially weighted mean of TR, `NaN` for the first
//! (n-1) bars.

use crate::domain::indicator::moving_average::calculate_ema_min_periods;
use crate::domain::indicator_helpers::true_range;

pub fn calculate_atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let tr = true_range(high, low, close);
    calculate_ema_min_periods(&tr, period, period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atr_warmup() {
        let high = [11.0, 12.0, 13.0, 14.0];
        let low = [9.0, 10.0, 11.0, 12.0];
        let close = [10.0, 11.0, 12.0, 13.0];
        let atr = calculate_atr(&high, &low, &close, 3);
        assert!(atr[0].is_nan());
        assert!(atr[1].is_nan());
        assert!(!atr[2].is_nan());
    }

    #[test]
    fn atr_constant_range() {
        // every bar has range 2 and no gap against the prior close
        let high = [11.0; 8];
        let low = [9.0; 8];
        let close = [10.0; 8];
        let atr = calculate_atr(&high, &low, &close, 3);
        for v in &atr[2..] {
            assert!((v - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn atr_reacts_to_gap() {
        let high = [11.0, 11.0, 31.0];
        let low = [9.0, 9.0, 29.0];
        let close = [10.0, 10.0, 30.0];
        let atr = calculate_atr(&high, &low, &close, 1);
        // gap bar: |31 - 10| = 21
        assert!((atr[2] - 21.0).abs() < 1e-12);
    }
}
