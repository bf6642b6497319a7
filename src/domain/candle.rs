//! Candle representation and raw-row validation.

use chrono::{NaiveDate, NaiveDateTime};

use super::error::CandlebotError;

/// One instrument's OHLC bar for one period.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Candle {
    pub instrument: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Whether `price` lies within this bar's high/low range, bounds included.
    pub fn touches(&self, price: f64) -> bool {
        price.is_finite() && self.low <= price && price <= self.high
    }
}

/// A row as delivered by the fetch layer, before validation.
///
/// Every field is optional so that a missing value can be reported as a
/// schema error naming the row and the field.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandleRecord {
    pub instrument_id: Option<String>,
    pub timestamp: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
}

impl CandleRecord {
    pub fn new(instrument: &str, timestamp: &str, open: f64, high: f64, low: f64, close: f64) -> Self {
        CandleRecord {
            instrument_id: Some(instrument.to_string()),
            timestamp: Some(timestamp.to_string()),
            open: Some(open.to_string()),
            high: Some(high.to_string()),
            low: Some(low.to_string()),
            close: Some(close.to_string()),
        }
    }

    /// Validate the record into a [`Candle`]; `row` is only used for error reporting.
    pub fn to_candle(&self, row: usize) -> Result<Candle, CandlebotError> {
        let instrument = required(row, "instrument_id", self.instrument_id.as_deref())?;
        let raw_ts = required(row, "timestamp", self.timestamp.as_deref())?;
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| CandlebotError::Schema {
            row,
            field: "timestamp".into(),
            reason: format!("has unparseable value `{raw_ts}`"),
        })?;

        Ok(Candle {
            instrument: instrument.to_string(),
            timestamp,
            open: price(row, "open", self.open.as_deref())?,
            high: price(row, "high", self.high.as_deref())?,
            low: price(row, "low", self.low.as_deref())?,
            close: price(row, "close", self.close.as_deref())?,
        })
    }
}

fn required<'a>(row: usize, field: &str, value: Option<&'a str>) -> Result<&'a str, CandlebotError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CandlebotError::Schema {
            row,
            field: field.to_string(),
            reason: "is missing".into(),
        }),
    }
}

fn price(row: usize, field: &str, value: Option<&str>) -> Result<f64, CandlebotError> {
    let raw = required(row, field, value)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CandlebotError::Schema {
            row,
            field: field.to_string(),
            reason: format!("has non-numeric value `{raw}`"),
        }),
    }
}

/// Parse a broker timestamp with second precision.
///
/// Accepts `2021-06-24T06:30:00Z`, the lower-cased `2021-06-24t06:30:00z`,
/// a space separator, and a bare date (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let normalized = raw.trim().to_ascii_uppercase();
    let normalized = normalized.strip_suffix('Z').unwrap_or(&normalized);

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(normalized, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(normalized, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Inverse of [`parse_timestamp`] for export.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
