//! OHLCV bar representation and input validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::WfsimError;
use super::range::TimeRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Fails fast unless dates are strictly increasing. Equal dates are reported
/// as duplicates, earlier dates as unsorted input.
pub fn validate_bars(bars: &[Bar]) -> Result<(), WfsimError> {
    for pair in bars.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.date == prev.date && curr.symbol == prev.symbol {
            return Err(WfsimError::DuplicateBar {
                symbol: curr.symbol.clone(),
                date: curr.date,
            });
        }
        if curr.date <= prev.date {
            return Err(WfsimError::UnsortedInput {
                symbol: curr.symbol.clone(),
                date: curr.date,
                previous: prev.date,
            });
        }
    }
    Ok(())
}

/// Bars for a single symbol plus optional alternative-data columns aligned
/// row-for-row with the bars.
#[derive(Debug, Clone, PartialEq)]
pub struct BarFrame {
    pub symbol: String,
    bars: Vec<Bar>,
    extra: BTreeMap<String, Vec<f64>>,
}

impl BarFrame {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, WfsimError> {
        validate_bars(&bars)?;
        Ok(Self {
            symbol: symbol.into(),
            bars,
            extra: BTreeMap::new(),
        })
    }

    /// Attach an alternative-data column. Its length must match the bars.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, WfsimError> {
        let name = name.into();
        if values.len() != self.bars.len() {
            return Err(WfsimError::MalformedInput {
                location: format!("{} column {}", self.symbol, name),
                reason: format!(
                    "{} values for {} bars",
                    values.len(),
                    self.bars.len()
                ),
            });
        }
        self.extra.insert(name, values);
        Ok(self)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.extra.get(name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Number of bars whose date falls inside `range`.
    pub fn count_in(&self, range: &TimeRange) -> usize {
        self.bars.iter().filter(|b| range.contains(b.date)).count()
    }

    /// Prefix of the frame strictly before `end`. Everything the returned
    /// frame contains was known before `end`.
    pub fn before(&self, end: NaiveDate) -> BarFrame {
        let cut = self.bars.partition_point(|b| b.date < end);
        BarFrame {
            symbol: self.symbol.clone(),
            bars: self.bars[..cut].to_vec(),
            extra: self
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), v[..cut].to_vec()))
                .collect(),
        }
    }
}
