//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//! - Width: (Upper - Lower) / Middle
//! - Diff: Upper - Lower
//!
//! StdDev is the sample standard deviation (divides by N-1).
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first (period-1) bars are `NaN`.

use crate::domain::indicator_helpers::{rolling_mean, rolling_std};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
    pub width: Vec<f64>,
    pub diff: Vec<f64>,
}

pub fn calculate_bollinger(close: &[f64], period: usize, multiplier: f64) -> BollingerBands {
    let middle = rolling_mean(close, period);
    let std = rolling_std(close, period);

    let upper: Vec<f64> = middle.iter().zip(&std).map(|(m, s)| m + multiplier * s).collect();
    let lower: Vec<f64> = middle.iter().zip(&std).map(|(m, s)| m - multiplier * s).collect();
    let diff: Vec<f64> = upper.iter().zip(&lower).map(|(u, l)| u - l).collect();
    let width = diff.iter().zip(&middle).map(|(d, m)| d / m).collect();

    BollingerBands {
        upper,
        middle,
        lower,
        width,
        diff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_warmup() {
        let close = [10.0, 11.0, 12.0, 13.0];
        let bands = calculate_bollinger(&close, 3, DEFAULT_MULTIPLIER);
        assert!(bands.upper[1].is_nan());
        assert!(bands.middle[1].is_nan());
        assert!(!bands.lower[2].is_nan());
    }

    #[test]
    fn bollinger_constant_prices_collapse() {
        let bands = calculate_bollinger(&[100.0; 5], 3, 2.0);
        assert!((bands.upper[4] - 100.0).abs() < f64::EPSILON);
        assert!((bands.lower[4] - 100.0).abs() < f64::EPSILON);
        assert!(bands.width[4].abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_known_values() {
        // [1, 2, 3]: mean 2, sample std 1
        let bands = calculate_bollinger(&[1.0, 2.0, 3.0], 3, 2.0);
        assert!((bands.middle[2] - 2.0).abs() < 1e-12);
        assert!((bands.upper[2] - 4.0).abs() < 1e-12);
        assert!(bands.lower[2].abs() < 1e-12);
        assert!((bands.diff[2] - 4.0).abs() < 1e-12);
        assert!((bands.width[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn bollinger_symmetry() {
        let close = [10.0, 12.0, 11.0, 15.0, 9.0, 13.0];
        let bands = calculate_bollinger(&close, 4, 2.5);
        for i in 3..close.len() {
            let up = bands.upper[i] - bands.middle[i];
            let down = bands.middle[i] - bands.lower[i];
            assert!((up - down).abs() < 1e-10);
        }
    }
}
