//! Candle source port.

use crate::domain::candle::CandleRecord;
use crate::domain::error::CandlebotError;

/// Supplies raw candle rows. Validation happens when the rows are loaded
/// into a table, so a source may hand over incomplete records.
pub trait DataPort {
    /// Rows for `instruments`, or every instrument the source holds when the
    /// slice is empty.
    fn fetch_candles(&self, instruments: &[String]) -> Result<Vec<CandleRecord>, CandlebotError>;

    fn list_instruments(&self) -> Result<Vec<String>, CandlebotError>;
}
