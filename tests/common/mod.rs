#![allow(dead_code)]

use candlebot::domain::candle::CandleRecord;
use candlebot::domain::error::CandlebotError;
use candlebot::domain::signal::SIGNAL_COLUMN;
use candlebot::domain::table::TimeSeriesTable;
use candlebot::ports::data_port::DataPort;
use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

pub struct MockDataPort {
    pub data: BTreeMap<String, Vec<CandleRecord>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    pub fn with_records(mut self, instrument: &str, records: Vec<CandleRecord>) -> Self {
        self.data.insert(instrument.to_string(), records);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_candles(&self, instruments: &[String]) -> Result<Vec<CandleRecord>, CandlebotError> {
        if instruments.is_empty() {
            return Ok(self.data.values().flatten().cloned().collect());
        }
        let mut out = Vec::new();
        for id in instruments {
            let records = self.data.get(id).ok_or_else(|| CandlebotError::NoData {
                instrument: id.clone(),
            })?;
            out.extend(records.iter().cloned());
        }
        Ok(out)
    }

    fn list_instruments(&self) -> Result<Vec<String>, CandlebotError> {
        Ok(self.data.keys().cloned().collect())
    }
}

/// `2024-01-01` plus `i` days, as a timestamp string.
pub fn day(i: usize) -> String {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    base.checked_add_days(Days::new(i as u64))
        .unwrap()
        .format("%Y-%m-%dT00:00:00Z")
        .to_string()
}

pub fn bar(instrument: &str, i: usize, open: f64, high: f64, low: f64, close: f64) -> CandleRecord {
    CandleRecord::new(instrument, &day(i), open, high, low, close)
}

/// Deterministic trending sine wave: enough swings to trigger every recipe.
pub fn synthetic_series(instrument: &str, n: usize, base: f64, phase: f64) -> Vec<CandleRecord> {
    let mut prev_close = base;
    (0..n)
        .map(|i| {
            let t = i as f64;
            let close = base + 0.05 * t + base * 0.08 * (t / 9.0 + phase).sin() + base * 0.02 * (t / 2.3).cos();
            let open = prev_close;
            let high = open.max(close) + base * 0.006;
            let low = open.min(close) - base * 0.006;
            prev_close = close;
            bar(instrument, i, open, high, low, close)
        })
        .collect()
}

/// Two instruments of `n` bars each.
pub fn two_instrument_records(n: usize) -> Vec<CandleRecord> {
    let mut records = synthetic_series("18", n, 100.0, 0.0);
    records.extend(synthetic_series("2", n, 40.0, 1.7));
    records
}

/// One instrument from (open, high, low, close, signal) rows.
pub fn signal_table(instrument: &str, bars: &[(f64, f64, f64, f64, &str)]) -> TimeSeriesTable {
    let records: Vec<CandleRecord> = bars
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c, _))| bar(instrument, i, o, h, l, c))
        .collect();
    let mut table = TimeSeriesTable::build(&records).unwrap();
    table
        .set_label(
            SIGNAL_COLUMN,
            bars.iter().map(|b| Some(b.4.to_string())).collect(),
        )
        .unwrap();
    table
}

pub fn flat(price: f64) -> (f64, f64, f64, f64, &'static str) {
    (price, price + 1.0, price - 1.0, price, "-")
}
