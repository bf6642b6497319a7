//! Multi-instrument time-series table.
//!
//! Long-form, columnar storage keyed by (instrument, timestamp). The four
//! price fields are fixed; indicator and strategy output lives in named
//! extension columns that grow over the table's lifetime. After every
//! mutation rows are sorted by (instrument, timestamp), so each instrument
//! occupies one contiguous row range.

use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, info};

use super::candle::{Candle, CandleRecord, format_timestamp};
use super::error::CandlebotError;

pub const BASE_FIELDS: [&str; 4] = ["open", "high", "low", "close"];

/// Storage for one extension column. Numeric nulls are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Label(Vec<Option<String>>),
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Label(v) => v.len(),
        }
    }

    fn extend_null(&mut self, count: usize) {
        match self {
            Column::Numeric(v) => v.extend(std::iter::repeat_n(f64::NAN, count)),
            Column::Label(v) => v.extend(std::iter::repeat_n(None, count)),
        }
    }

    fn permute(&mut self, order: &[usize]) {
        match self {
            Column::Numeric(v) => {
                let permuted: Vec<f64> = order.iter().map(|&i| v[i]).collect();
                *v = permuted;
            }
            Column::Label(v) => {
                let permuted: Vec<Option<String>> = order.iter().map(|&i| v[i].clone()).collect();
                *v = permuted;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct NamedColumn {
    name: String,
    data: Column,
}

/// One instrument's contiguous block of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentGroup {
    pub instrument: String,
    pub rows: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesTable {
    instruments: Vec<String>,
    timestamps: Vec<NaiveDateTime>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    columns: Vec<NamedColumn>,
}

impl TimeSeriesTable {
    /// Build a table from raw fetch-layer rows.
    pub fn build(records: &[CandleRecord]) -> Result<Self, CandlebotError> {
        let candles = records
            .iter()
            .enumerate()
            .map(|(row, r)| r.to_candle(row))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_candles(candles)
    }

    pub fn from_candles(candles: Vec<Candle>) -> Result<Self, CandlebotError> {
        let mut table = TimeSeriesTable::default();
        table.append_candles(candles)?;
        info!(
            rows = table.len(),
            instruments = table.instrument_count(),
            "built time-series table"
        );
        Ok(table)
    }

    /// Merge raw rows for existing or new instruments, then re-sort.
    ///
    /// Returns the number of rows added.
    pub fn append(&mut self, records: &[CandleRecord]) -> Result<usize, CandlebotError> {
        let candles = records
            .iter()
            .enumerate()
            .map(|(row, r)| r.to_candle(row))
            .collect::<Result<Vec<_>, _>>()?;
        self.append_candles(candles)
    }

    /// Merge validated candles. A row whose (instrument, timestamp) already
    /// exists, in the table or earlier in the batch, rejects the whole batch.
    pub fn append_candles(&mut self, candles: Vec<Candle>) -> Result<usize, CandlebotError> {
        let mut seen: HashSet<(&str, NaiveDateTime)> = self
            .instruments
            .iter()
            .zip(&self.timestamps)
            .map(|(i, t)| (i.as_str(), *t))
            .collect();
        for candle in &candles {
            if !seen.insert((candle.instrument.as_str(), candle.timestamp)) {
                return Err(CandlebotError::DuplicateRow {
                    instrument: candle.instrument.clone(),
                    timestamp: format_timestamp(&candle.timestamp),
                });
            }
        }
        drop(seen);

        let added = candles.len();
        if added == 0 {
            return Ok(0);
        }

        for candle in candles {
            self.instruments.push(candle.instrument);
            self.timestamps.push(candle.timestamp);
            self.open.push(candle.open);
            self.high.push(candle.high);
            self.low.push(candle.low);
            self.close.push(candle.close);
        }
        for column in &mut self.columns {
            column.data.extend_null(added);
        }
        self.sort();
        debug!(added, rows = self.len(), "appended rows");
        Ok(added)
    }

    fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            compare_instruments(&self.instruments[a], &self.instruments[b])
                .then(self.timestamps[a].cmp(&self.timestamps[b]))
        });
        if order.iter().enumerate().all(|(pos, &i)| pos == i) {
            return;
        }

        self.instruments = order.iter().map(|&i| self.instruments[i].clone()).collect();
        self.timestamps = order.iter().map(|&i| self.timestamps[i]).collect();
        self.open = order.iter().map(|&i| self.open[i]).collect();
        self.high = order.iter().map(|&i| self.high[i]).collect();
        self.low = order.iter().map(|&i| self.low[i]).collect();
        self.close = order.iter().map(|&i| self.close[i]).collect();
        for column in &mut self.columns {
            column.data.permute(&order);
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn instrument_count(&self) -> usize {
        self.group_by_instrument().count()
    }

    pub fn instruments(&self) -> Vec<String> {
        self.group_by_instrument().map(|g| g.instrument).collect()
    }

    pub fn contains_instrument(&self, instrument: &str) -> bool {
        self.instrument_rows(instrument).is_some()
    }

    /// Partition rows by instrument, in table order. Computed lazily from
    /// the sorted instrument column.
    pub fn group_by_instrument(&self) -> GroupIter<'_> {
        GroupIter {
            instruments: &self.instruments,
            start: 0,
        }
    }

    /// Read views over each instrument's rows, in table order.
    pub fn groups(&self) -> impl Iterator<Item = GroupView<'_>> {
        self.group_by_instrument()
            .map(move |group| GroupView { table: self, group })
    }

    pub fn instrument_rows(&self, instrument: &str) -> Option<Range<usize>> {
        self.group_by_instrument()
            .find(|g| g.instrument == instrument)
            .map(|g| g.rows)
    }

    /// Most recent timestamp held for `instrument`, used to fetch only newer rows.
    pub fn last_timestamp(&self, instrument: &str) -> Option<NaiveDateTime> {
        self.instrument_rows(instrument)
            .map(|rows| self.timestamps[rows.end - 1])
    }

    /// Exactly one row per instrument: the most recent by timestamp.
    pub fn latest_row_per_instrument(&self) -> Vec<RowView<'_>> {
        self.group_by_instrument()
            .map(|g| RowView {
                table: self,
                index: g.rows.end - 1,
            })
            .collect()
    }

    pub fn row(&self, index: usize) -> Option<RowView<'_>> {
        (index < self.len()).then_some(RowView { table: self, index })
    }

    pub(crate) fn candle(&self, index: usize) -> Candle {
        Candle {
            instrument: self.instruments[index].clone(),
            timestamp: self.timestamps[index],
            open: self.open[index],
            high: self.high[index],
            low: self.low[index],
            close: self.close[index],
        }
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        BASE_FIELDS.contains(&name) || self.find(name).is_some()
    }

    /// Fail with [`CandlebotError::MissingColumn`] naming every absent column.
    pub fn require_columns(&self, names: &[&str]) -> Result<(), CandlebotError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| !self.has_column(n))
            .map(|n| n.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CandlebotError::MissingColumn { columns: missing })
        }
    }

    fn find(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    /// A numeric field: one of the base prices or a numeric extension column.
    pub fn numeric(&self, name: &str) -> Result<&[f64], CandlebotError> {
        match name {
            "open" => Ok(&self.open),
            "high" => Ok(&self.high),
            "low" => Ok(&self.low),
            "close" => Ok(&self.close),
            _ => match self.find(name) {
                Some(Column::Numeric(v)) => Ok(v),
                Some(Column::Label(_)) => Err(CandlebotError::ColumnType {
                    column: name.to_string(),
                    expected: "numeric".into(),
                }),
                None => Err(CandlebotError::MissingColumn {
                    columns: vec![name.to_string()],
                }),
            },
        }
    }

    pub fn label(&self, name: &str) -> Result<&[Option<String>], CandlebotError> {
        match self.find(name) {
            Some(Column::Label(v)) => Ok(v),
            Some(Column::Numeric(_)) => Err(CandlebotError::ColumnType {
                column: name.to_string(),
                expected: "label".into(),
            }),
            None if BASE_FIELDS.contains(&name) => Err(CandlebotError::ColumnType {
                column: name.to_string(),
                expected: "label".into(),
            }),
            None => Err(CandlebotError::MissingColumn {
                columns: vec![name.to_string()],
            }),
        }
    }

    /// Replace (or add) a numeric column. Base price fields are read-only.
    pub fn set_numeric(&mut self, name: &str, values: Vec<f64>) -> Result<(), CandlebotError> {
        self.set_column(name, Column::Numeric(values))
    }

    pub fn set_label(&mut self, name: &str, values: Vec<Option<String>>) -> Result<(), CandlebotError> {
        self.set_column(name, Column::Label(values))
    }

    fn set_column(&mut self, name: &str, data: Column) -> Result<(), CandlebotError> {
        if BASE_FIELDS.contains(&name) {
            return Err(CandlebotError::ColumnType {
                column: name.to_string(),
                expected: "writable".into(),
            });
        }
        if data.len() != self.len() {
            return Err(CandlebotError::Schema {
                row: data.len(),
                field: name.to_string(),
                reason: format!("column length differs from table length {}", self.len()),
            });
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.data = data,
            None => self.columns.push(NamedColumn {
                name: name.to_string(),
                data,
            }),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        self.columns.len() != before
    }

    /// Run `f` once per instrument group and stitch the per-group output into
    /// one full-length column. `f` must return exactly one value per row.
    pub fn map_groups<T, F>(&self, mut f: F) -> Result<Vec<T>, CandlebotError>
    where
        F: FnMut(GroupView<'_>) -> Result<Vec<T>, CandlebotError>,
    {
        let mut out = Vec::with_capacity(self.len());
        for group in self.group_by_instrument() {
            let expected = group.rows.len();
            let view = GroupView {
                table: self,
                group: group.clone(),
            };
            let values = f(view)?;
            if values.len() != expected {
                return Err(CandlebotError::Schema {
                    row: group.rows.start,
                    field: group.instrument,
                    reason: format!("group transform produced {} values for {expected} rows", values.len()),
                });
            }
            out.extend(values);
        }
        Ok(out)
    }

    /// Per-instrument transform of one numeric source into one output column.
    pub fn transform<F>(&mut self, source: &str, output: &str, mut f: F) -> Result<(), CandlebotError>
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        let values = self.map_groups(|g| Ok(f(g.numeric(source)?)))?;
        self.set_numeric(output, values)
    }

    /// Render one cell as text for flat-file export; nulls become empty strings.
    /// `None` for an unknown column or an index past the end.
    pub fn cell_text(&self, index: usize, column: &str) -> Option<String> {
        if index >= self.len() {
            return None;
        }
        let text = match self.find(column)? {
            Column::Numeric(v) => {
                let x = v[index];
                if x.is_nan() { String::new() } else { x.to_string() }
            }
            Column::Label(v) => v[index].clone().unwrap_or_default(),
        };
        Some(text)
    }

    /// Header plus one text row per table row, in table order: instrument,
    /// timestamp, the price fields, then every extension column.
    pub fn to_rows(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut header = vec!["instrument_id".to_string(), "timestamp".to_string()];
        header.extend(BASE_FIELDS.iter().map(|f| f.to_string()));
        header.extend(self.columns.iter().map(|c| c.name.clone()));

        let rows = (0..self.len())
            .map(|i| {
                let mut row = vec![
                    self.instruments[i].clone(),
                    format_timestamp(&self.timestamps[i]),
                    self.open[i].to_string(),
                    self.high[i].to_string(),
                    self.low[i].to_string(),
                    self.close[i].to_string(),
                ];
                row.extend(
                    self.columns
                        .iter()
                        .map(|c| self.cell_text(i, &c.name).unwrap_or_default()),
                );
                row
            })
            .collect();
        (header, rows)
    }
}

/// Integer instrument ids compare numerically, everything else lexically.
/// Ids with the same numeric value (`1`, `01`) fall back to the text.
fn compare_instruments(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

pub struct GroupIter<'a> {
    instruments: &'a [String],
    start: usize,
}

impl Iterator for GroupIter<'_> {
    type Item = InstrumentGroup;

    fn next(&mut self) -> Option<InstrumentGroup> {
        let first = self.instruments.get(self.start)?;
        let len = self.instruments[self.start..]
            .iter()
            .take_while(|i| *i == first)
            .count();
        let group = InstrumentGroup {
            instrument: first.clone(),
            rows: self.start..self.start + len,
        };
        self.start += len;
        Some(group)
    }
}

/// Read access scoped to one instrument's rows.
#[derive(Clone)]
pub struct GroupView<'a> {
    table: &'a TimeSeriesTable,
    group: InstrumentGroup,
}

impl<'a> GroupView<'a> {
    pub fn instrument(&self) -> &str {
        &self.group.instrument
    }

    pub fn rows(&self) -> Range<usize> {
        self.group.rows.clone()
    }

    pub fn len(&self) -> usize {
        self.group.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.rows.is_empty()
    }

    pub fn numeric(&self, name: &str) -> Result<&'a [f64], CandlebotError> {
        Ok(&self.table.numeric(name)?[self.rows()])
    }

    pub fn label(&self, name: &str) -> Result<&'a [Option<String>], CandlebotError> {
        Ok(&self.table.label(name)?[self.rows()])
    }

    pub fn timestamps(&self) -> &'a [NaiveDateTime] {
        &self.table.timestamps[self.rows()]
    }

    pub fn candles(&self) -> Vec<Candle> {
        self.rows().map(|i| self.table.candle(i)).collect()
    }
}

/// A borrowed view of a single table row.
#[derive(Clone, Copy)]
pub struct RowView<'a> {
    table: &'a TimeSeriesTable,
    index: usize,
}

impl<'a> RowView<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn instrument(&self) -> &'a str {
        &self.table.instruments[self.index]
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.table.timestamps[self.index]
    }

    pub fn candle(&self) -> Candle {
        self.table.candle(self.index)
    }

    /// Numeric value of `column`; `None` for a missing column or a null cell.
    pub fn numeric(&self, column: &str) -> Option<f64> {
        self.table
            .numeric(column)
            .ok()
            .map(|v| v[self.index])
            .filter(|x| !x.is_nan())
    }

    pub fn label(&self, column: &str) -> Option<&'a str> {
        self.table
            .label(column)
            .ok()
            .and_then(|v| v[self.index].as_deref())
    }
}
