//! RSI (Relative Strength Index).
//!
//! Gains and losses are the clipped close-to-close changes, smoothed either
//! exponentially (center of mass n-1, i.e. Wilder's factor 1/n) or with a
//! simple n-bar mean.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100
//!
//! Warmup: the first n bars are `NaN`.

use std::fmt;

use crate::domain::indicator_helpers::{com_alpha, diff, ewm_mean, rolling_mean};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RsiSmoothing {
    #[default]
    Exponential,
    Simple,
}

impl fmt::Display for RsiSmoothing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsiSmoothing::Exponential => write!(f, "ewm"),
            RsiSmoothing::Simple => write!(f, "sma"),
        }
    }
}

pub fn calculate_rsi(close: &[f64], period: usize, smoothing: RsiSmoothing) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; close.len()];
    }

    let delta = diff(close, 1);
    let up: Vec<f64> = delta
        .iter()
        .map(|&d| if d.is_nan() { d } else { d.max(0.0) })
        .collect();
    let down: Vec<f64> = delta
        .iter()
        .map(|&d| if d.is_nan() { d } else { (-d).max(0.0) })
        .collect();

    let (avg_up, avg_down) = match smoothing {
        RsiSmoothing::Exponential => {
            let alpha = com_alpha((period - 1) as f64);
            (ewm_mean(&up, alpha, period), ewm_mean(&down, alpha, period))
        }
        RsiSmoothing::Simple => (rolling_mean(&up, period), rolling_mean(&down, period)),
    };

    avg_up
        .iter()
        .zip(&avg_down)
        .map(|(&gain, &loss)| {
            if gain.is_nan() || loss.is_nan() {
                f64::NAN
            } else if loss == 0.0 {
                if gain == 0.0 { f64::NAN } else { 100.0 }
            } else {
                100.0 - 100.0 / (1.0 + gain / loss)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_warmup() {
        let close: Vec<f64> = (0..20).map(|i| 100.0 + (i % 3) as f64).collect();
        let rsi = calculate_rsi(&close, 14, RsiSmoothing::Exponential);
        assert!(rsi[..14].iter().all(|x| x.is_nan()));
        assert!(!rsi[14].is_nan());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let close: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let rsi = calculate_rsi(&close, 3, RsiSmoothing::Simple);
        assert!((rsi[9] - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let close: Vec<f64> = (0..10).map(|i| 100.0 - i as f64).collect();
        let rsi = calculate_rsi(&close, 3, RsiSmoothing::Exponential);
        assert!(rsi[9].abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_simple_balanced_moves_is_50() {
        let close = [10.0, 11.0, 10.0, 11.0, 10.0];
        let rsi = calculate_rsi(&close, 2, RsiSmoothing::Simple);
        assert!((rsi[4] - 50.0).abs() < 1e-12);
    }

    #[test]
    fn rsi_bounded() {
        let close = [44.0, 44.3, 44.1, 43.6, 44.3, 44.8, 45.1, 45.4, 45.8, 46.1, 45.9, 46.3];
        for smoothing in [RsiSmoothing::Exponential, RsiSmoothing::Simple] {
            for v in calculate_rsi(&close, 5, smoothing).into_iter().filter(|v| !v.is_nan()) {
                assert!((0.0..=100.0).contains(&v));
            }
        }
    }

    #[test]
    fn rsi_flat_series_is_undefined() {
        let rsi = calculate_rsi(&[5.0; 6], 2, RsiSmoothing::Simple);
        assert!(rsi.iter().all(|x| x.is_nan()));
    }
}
