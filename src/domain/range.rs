//! Half-open date ranges and window lengths.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `[start, end)` over calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Window length in calendar units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowLength {
    Days(u32),
    Months(u32),
}

impl WindowLength {
    pub fn is_zero(&self) -> bool {
        matches!(self, WindowLength::Days(0) | WindowLength::Months(0))
    }

    pub fn advance(&self, date: NaiveDate) -> NaiveDate {
        match *self {
            WindowLength::Days(n) => date + Duration::days(n as i64),
            WindowLength::Months(n) => add_months(date, n as i32),
        }
    }

    /// `k` consecutive windows as one length.
    pub fn scaled(&self, k: u32) -> WindowLength {
        match *self {
            WindowLength::Days(n) => WindowLength::Days(n.saturating_mul(k)),
            WindowLength::Months(n) => WindowLength::Months(n.saturating_mul(k)),
        }
    }

    /// Approximate length in days, used only for ordering comparisons.
    pub fn approx_days(&self) -> i64 {
        match *self {
            WindowLength::Days(n) => n as i64,
            WindowLength::Months(n) => n as i64 * 30,
        }
    }
}

impl fmt::Display for WindowLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowLength::Days(n) => write!(f, "{}d", n),
            WindowLength::Months(n) => write!(f, "{}m", n),
        }
    }
}

impl FromStr for WindowLength {
    type Err = String;

    /// Parses `90d` or `6m`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((idx, _)) = s.char_indices().last() else {
            return Err("empty window length".to_string());
        };
        let (digits, unit) = s.split_at(idx);
        let n: u32 = digits
            .parse()
            .map_err(|_| format!("invalid window length '{}', expected e.g. 90d or 6m", s))?;
        match unit {
            "d" | "D" => Ok(WindowLength::Days(n)),
            "m" | "M" => Ok(WindowLength::Months(n)),
            _ => Err(format!("invalid window unit in '{}', expected d or m", s)),
        }
    }
}

/// Add calendar months, clamping the day to the target month's length.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let mut day = date.day();
    loop {
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return d;
        }
        day -= 1;
    }
}
