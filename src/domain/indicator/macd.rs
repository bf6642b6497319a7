//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow), each warm until its own period
//! Signal Line = EMA(signal) of MACD Line, warm after (signal - 1) values
//! Histogram = MACD Line - Signal Line
//!
//! Line and signal are rounded to six decimals so that crossovers compare
//! stable values.
//!
//! Default parameters: fast=12, slow=26, signal=9

use crate::domain::indicator::moving_average::calculate_ema_min_periods;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn calculate_macd(close: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let ema_fast = calculate_ema_min_periods(close, fast, fast);
    let ema_slow = calculate_ema_min_periods(close, slow, slow);

    let line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| round6(f - s))
        .collect();
    let signal: Vec<f64> = calculate_ema_min_periods(&line, signal_period, signal_period.saturating_sub(1))
        .into_iter()
        .map(round6)
        .collect();
    let histogram = line.iter().zip(&signal).map(|(l, s)| l - s).collect();

    MacdSeries {
        line,
        signal,
        histogram,
    }
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}
