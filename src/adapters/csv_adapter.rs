//! CSV bar data adapter.
//!
//! Reads an enriched bar series from a headered CSV file. Six columns are
//! required (timestamp, open, high, low, close, volume); `volume_class` and
//! `ribbon_state` are recognized when present; every other column is treated
//! as a named indicator. Empty or non-numeric indicator cells mean "absent
//! on this bar" and are simply skipped.

use std::fs;

use chrono::NaiveDateTime;

use crate::domain::bar::{Bar, RibbonState, VolumeClass};
use crate::domain::error::TradesimError;
use crate::ports::data_port::DataPort;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const REQUIRED: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

#[derive(Default)]
pub struct CsvDataAdapter;

impl CsvDataAdapter {
    pub fn new() -> Self {
        Self
    }
}

struct Layout {
    required: [usize; 6],
    volume_class: Option<usize>,
    ribbon_state: Option<usize>,
    /// Everything else, kept by header name.
    indicators: Vec<(String, usize)>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, TradesimError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let mut required = [0usize; 6];
        for (slot, name) in required.iter_mut().zip(REQUIRED) {
            *slot = find(name).ok_or_else(|| TradesimError::MissingField {
                field: name.to_string(),
            })?;
        }
        let volume_class = find("volume_class");
        let ribbon_state = find("ribbon_state");

        let special: Vec<usize> = required
            .iter()
            .copied()
            .chain(volume_class)
            .chain(ribbon_state)
            .collect();
        let indicators = headers
            .iter()
            .enumerate()
            .filter(|(index, _)| !special.contains(index))
            .map(|(index, name)| (name.trim().to_string(), index))
            .collect();

        Ok(Layout {
            required,
            volume_class,
            ribbon_state,
            indicators,
        })
    }
}

fn cell<'r>(record: &'r csv::StringRecord, index: usize, line: usize) -> Result<&'r str, TradesimError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| TradesimError::MalformedRow {
            line,
            reason: format!("row has no column {index}"),
        })
}

fn parse_number(raw: &str, field: &str, line: usize) -> Result<f64, TradesimError> {
    raw.parse::<f64>().map_err(|_| TradesimError::MalformedRow {
        line,
        reason: format!("{field} value {raw:?} is not a number"),
    })
}

impl DataPort for CsvDataAdapter {
    fn fetch_bars(&self, source: &str) -> Result<Vec<Bar>, TradesimError> {
        let content = fs::read_to_string(source)?;
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let layout = Layout::from_headers(reader.headers().map_err(|e| {
            TradesimError::MalformedRow {
                line: 1,
                reason: e.to_string(),
            }
        })?)?;

        let mut bars = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let line = row + 2;
            let record = result.map_err(|e| TradesimError::MalformedRow {
                line,
                reason: e.to_string(),
            })?;

            let [ts_idx, open_idx, high_idx, low_idx, close_idx, volume_idx] = layout.required;
            let raw_ts = cell(&record, ts_idx, line)?;
            let timestamp = NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT).map_err(
                |e| TradesimError::MalformedRow {
                    line,
                    reason: format!("timestamp {raw_ts:?}: {e}"),
                },
            )?;

            let mut bar = Bar {
                timestamp,
                open: parse_number(cell(&record, open_idx, line)?, "open", line)?,
                high: parse_number(cell(&record, high_idx, line)?, "high", line)?,
                low: parse_number(cell(&record, low_idx, line)?, "low", line)?,
                close: parse_number(cell(&record, close_idx, line)?, "close", line)?,
                volume: parse_number(cell(&record, volume_idx, line)?, "volume", line)?,
                volume_class: None,
                ribbon_state: None,
                indicators: std::collections::HashMap::new(),
            };

            if let Some(index) = layout.volume_class {
                bar.volume_class = record.get(index).and_then(|v| VolumeClass::parse(v.trim()));
            }
            if let Some(index) = layout.ribbon_state {
                bar.ribbon_state = record.get(index).and_then(|v| RibbonState::parse(v.trim()));
            }
            for (name, index) in &layout.indicators {
                if let Some(value) = record
                    .get(*index)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .and_then(|v| v.parse::<f64>().ok())
                {
                    bar.indicators.insert(name.clone(), value);
                }
            }
            bars.push(bar);
        }
        Ok(bars)
    }
}
