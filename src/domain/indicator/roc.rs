//! Price change and Rate of Change.
//!
//! Change in price = C[i] - C[i-1]
//! ROC(n)[i] = C[i] / C[i-n] - 1 (a fraction, not a percentage)
//! Warmup: first n bars are `NaN`. A zero base price yields `NaN`.

use crate::domain::indicator_helpers::diff;

pub fn calculate_change_in_price(close: &[f64]) -> Vec<f64> {
    diff(close, 1)
}

pub fn calculate_roc(close: &[f64], period: usize) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            if period == 0 || i < period {
                return f64::NAN;
            }
            let base = close[i - period];
            if base == 0.0 {
                f64::NAN
            } else {
                close[i] / base - 1.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_in_price() {
        let out = calculate_change_in_price(&[10.0, 12.0, 11.0]);
        assert!(out[0].is_nan());
        assert!((out[1] - 2.0).abs() < f64::EPSILON);
        assert!((out[2] + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn roc_basic() {
        let out = calculate_roc(&[100.0, 110.0, 121.0], 1);
        assert!(out[0].is_nan());
        assert!((out[1] - 0.1).abs() < 1e-12);
        assert!((out[2] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn roc_longer_period() {
        let out = calculate_roc(&[100.0, 50.0, 150.0], 2);
        assert!(out[1].is_nan());
        assert!((out[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn roc_zero_base_is_nan() {
        let out = calculate_roc(&[0.0, 10.0], 1);
        assert!(out[1].is_nan());
    }

    #[test]
    fn roc_period_0() {
        assert!(calculate_roc(&[1.0, 2.0], 0).iter().all(|x| x.is_nan()));
    }
}
