//! CSV candle source and table export.
//!
//! Input is one long-form file, one candle per line, with a header naming
//! at least the instrument, timestamp and the four prices. Extra columns
//! (volume, say) are ignored.

use crate::domain::candle::CandleRecord;
use crate::domain::error::CandlebotError;
use crate::domain::table::TimeSeriesTable;
use crate::ports::data_port::DataPort;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

const INSTRUMENT_HEADERS: [&str; 3] = ["instrument_id", "instrument", "symbol"];
const TIMESTAMP_HEADERS: [&str; 3] = ["timestamp", "datetime", "date"];

pub struct CsvAdapter {
    path: PathBuf,
}

/// Column positions resolved from the header row.
struct Layout {
    instrument: usize,
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, CandlebotError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim().to_ascii_lowercase().as_str()))
        };
        let mut missing = Vec::new();
        let mut need = |names: &[&'static str]| {
            find(names).unwrap_or_else(|| {
                missing.push(names[0]);
                0
            })
        };
        let layout = Layout {
            instrument: need(&INSTRUMENT_HEADERS),
            timestamp: need(&TIMESTAMP_HEADERS),
            open: need(&["open"]),
            high: need(&["high"]),
            low: need(&["low"]),
            close: need(&["close"]),
        };
        if missing.is_empty() {
            Ok(layout)
        } else {
            Err(CandlebotError::DataFile {
                reason: format!("missing header columns: {}", missing.join(", ")),
            })
        }
    }

    fn record(&self, row: &csv::StringRecord) -> CandleRecord {
        let cell = |i: usize| {
            row.get(i)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        CandleRecord {
            instrument_id: cell(self.instrument),
            timestamp: cell(self.timestamp),
            open: cell(self.open),
            high: cell(self.high),
            low: cell(self.low),
            close: cell(self.close),
        }
    }
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<Vec<CandleRecord>, CandlebotError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| CandlebotError::DataFile {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;
        let headers = rdr.headers().map_err(|e| CandlebotError::DataFile {
            reason: format!("CSV header error: {}", e),
        })?;
        let layout = Layout::from_headers(headers)?;

        rdr.records()
            .map(|row| {
                row.map(|r| layout.record(&r))
                    .map_err(|e| CandlebotError::DataFile {
                        reason: format!("CSV parse error: {}", e),
                    })
            })
            .collect()
    }
}

impl DataPort for CsvAdapter {
    fn fetch_candles(&self, instruments: &[String]) -> Result<Vec<CandleRecord>, CandlebotError> {
        let mut records = self.read_all()?;
        if !instruments.is_empty() {
            records.retain(|r| {
                r.instrument_id
                    .as_ref()
                    .is_some_and(|id| instruments.contains(id))
            });
            if let Some(absent) = instruments
                .iter()
                .find(|i| !records.iter().any(|r| r.instrument_id.as_ref() == Some(*i)))
            {
                return Err(CandlebotError::NoData {
                    instrument: absent.clone(),
                });
            }
        }
        info!(path = %self.path.display(), rows = records.len(), "loaded candles");
        Ok(records)
    }

    fn list_instruments(&self) -> Result<Vec<String>, CandlebotError> {
        let ids: BTreeSet<String> = self
            .read_all()?
            .into_iter()
            .filter_map(|r| r.instrument_id)
            .collect();
        Ok(ids.into_iter().collect())
    }
}

/// Write every row and column of `table` to `path`; nulls are empty cells.
pub fn export_table(table: &TimeSeriesTable, path: &Path) -> Result<(), CandlebotError> {
    let to_err = |e: csv::Error| CandlebotError::DataFile {
        reason: format!("failed to write {}: {}", path.display(), e),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(to_err)?;
    let (header, rows) = table.to_rows();
    wtr.write_record(&header).map_err(to_err)?;
    for row in &rows {
        wtr.write_record(row).map_err(to_err)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = rows.len(), columns = header.len(), "exported table");
    Ok(())
}
