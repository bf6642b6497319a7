//! Standard deviation and rolling sum.
//!
//! STDDEV(n) is the sample standard deviation (N-1 denominator) over the
//! last n values of the source field.
//! Warmup: first (n-1) bars are `NaN`.

use crate::domain::indicator_helpers::{rolling_std, rolling_sum};

pub fn calculate_stddev(values: &[f64], period: usize) -> Vec<f64> {
    rolling_std(values, period)
}

pub fn calculate_rolling_sum(values: &[f64], period: usize) -> Vec<f64> {
    rolling_sum(values, period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stddev_constant_is_zero() {
        let out = calculate_stddev(&[5.0; 6], 3);
        assert!(out[1].is_nan());
        assert!(out[2..].iter().all(|v| v.abs() < f64::EPSILON));
    }

    #[test]
    fn stddev_known_value() {
        // [1, 2, 3]: mean 2, sample variance 1
        let out = calculate_stddev(&[1.0, 2.0, 3.0], 3);
        assert!((out[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stddev_period_1_is_undefined() {
        assert!(calculate_stddev(&[1.0, 2.0], 1).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rolling_sum_window() {
        let out = calculate_rolling_sum(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[3.0, 5.0, 7.0]);
    }
}
