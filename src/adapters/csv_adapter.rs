//! CSV file bar source.
//!
//! One file per symbol, `{base_path}/{SYMBOL}.csv`, with a header row that
//! names at least `date,open,high,low,close,volume`. Any further numeric
//! columns are attached to the frame as alternative-data columns. Rows are
//! taken in file order; out-of-order or duplicate dates are rejected by
//! [`BarFrame::new`] rather than silently sorted.

use crate::domain::bar::{Bar, BarFrame};
use crate::domain::error::WfsimError;
use crate::domain::range::TimeRange;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, WfsimError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| WfsimError::MissingColumn {
            column: name.to_string(),
        })
}

fn parse_number(
    record: &csv::StringRecord,
    index: usize,
    column: &str,
    location: &str,
) -> Result<f64, WfsimError> {
    let raw = record.get(index).unwrap_or("").trim();
    raw.parse::<f64>().map_err(|e| WfsimError::MalformedInput {
        location: location.to_string(),
        reason: format!("invalid {} value '{}': {}", column, raw, e),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str, range: Option<TimeRange>) -> Result<BarFrame, WfsimError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());

        let headers = rdr
            .headers()
            .map_err(|e| WfsimError::MalformedInput {
                location: path.display().to_string(),
                reason: format!("CSV header error: {}", e),
            })?
            .clone();
        let date_idx = column_index(&headers, "date")?;
        let price_idx = PRICE_COLUMNS
            .iter()
            .map(|name| column_index(&headers, name))
            .collect::<Result<Vec<_>, _>>()?;
        let extra: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx && !price_idx.contains(i))
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        let mut bars = Vec::new();
        let mut extra_values: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for (line, result) in rdr.records().enumerate() {
            // Header is line 1.
            let location = format!("{}:{}", path.display(), line + 2);
            let record = result.map_err(|e| WfsimError::MalformedInput {
                location: location.clone(),
                reason: format!("CSV parse error: {}", e),
            })?;

            let date_str = record.get(date_idx).unwrap_or("").trim();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                WfsimError::MalformedInput {
                    location: location.clone(),
                    reason: format!("invalid date '{}': {}", date_str, e),
                }
            })?;

            if let Some(range) = &range {
                if !range.contains(date) {
                    continue;
                }
            }

            let mut prices = [0.0; 5];
            for (slot, (&idx, name)) in prices.iter_mut().zip(price_idx.iter().zip(PRICE_COLUMNS)) {
                *slot = parse_number(&record, idx, name, &location)?;
            }
            let [open, high, low, close, volume] = prices;

            for (idx, name) in &extra {
                let raw = record.get(*idx).unwrap_or("").trim();
                // Blank alt-data cells are missing observations, kept as NaN
                // so the feature pipeline masks them.
                let value = if raw.is_empty() {
                    f64::NAN
                } else {
                    parse_number(&record, *idx, name, &location)?
                };
                extra_values.entry(name.clone()).or_default().push(value);
            }

            bars.push(Bar {
                symbol: symbol.to_string(),
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        debug!(
            symbol,
            bars = bars.len(),
            alt_columns = extra.len(),
            path = %path.display(),
            "loaded bars from csv"
        );

        let mut frame = BarFrame::new(symbol, bars)?;
        for (name, values) in extra_values {
            frame = frame.with_column(name, values)?;
        }
        Ok(frame)
    }

    fn list_symbols(&self) -> Result<Vec<String>, WfsimError> {
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    symbols.push(stem.to_string());
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}
