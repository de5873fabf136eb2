//! Train/evaluation window generation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::WfsimError;
use crate::domain::range::{TimeRange, WindowLength};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Fixed-length training window that slides with each step.
    #[default]
    Rolling,
    /// Training window always starts at the beginning of the range.
    Anchored,
}

impl FromStr for SplitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolling" => Ok(SplitMode::Rolling),
            "anchored" | "expanding" => Ok(SplitMode::Anchored),
            other => Err(format!(
                "unknown split mode '{}', expected rolling or anchored",
                other
            )),
        }
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMode::Rolling => write!(f, "rolling"),
            SplitMode::Anchored => write!(f, "anchored"),
        }
    }
}

/// A training window and the strictly later window it is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardSplit {
    pub index: usize,
    pub train: TimeRange,
    pub eval: TimeRange,
}

impl WalkForwardSplit {
    pub fn new(index: usize, train: TimeRange, eval: TimeRange) -> Result<Self, WfsimError> {
        if train.is_empty() || eval.is_empty() {
            return Err(WfsimError::invalid(
                "walkforward",
                "split",
                format!("split {} has an empty window: train {} eval {}", index, train, eval),
            ));
        }
        if train.end > eval.start {
            return Err(WfsimError::invalid(
                "walkforward",
                "split",
                format!(
                    "split {} trains on {} which runs past evaluation start {}",
                    index, train, eval.start
                ),
            ));
        }
        Ok(WalkForwardSplit { index, train, eval })
    }
}

/// Generate chronologically advancing splits over `range`.
///
/// Split `i` starts its training window `i * step` after `range.start`
/// (rolling) or at `range.start` (anchored); evaluation immediately follows
/// training. The last evaluation window is clipped to `range.end`, and no
/// evaluation window runs past the start of the next one.
pub fn build_splits(
    range: TimeRange,
    train_window: WindowLength,
    eval_window: WindowLength,
    step: WindowLength,
    mode: SplitMode,
) -> Result<Vec<WalkForwardSplit>, WfsimError> {
    if range.is_empty() {
        return Err(WfsimError::invalid(
            "walkforward",
            "end_date",
            format!("range {} is empty", range),
        ));
    }
    for (key, window) in [
        ("train_window", train_window),
        ("eval_window", eval_window),
        ("step", step),
    ] {
        if window.is_zero() {
            return Err(WfsimError::invalid(
                "walkforward",
                key,
                format!("{} must be positive", key),
            ));
        }
    }
    if step.advance(range.start) < eval_window.advance(range.start) {
        return Err(WfsimError::invalid(
            "walkforward",
            "step",
            format!(
                "step {} is shorter than eval_window {}; evaluation windows would overlap",
                step, eval_window
            ),
        ));
    }
    if train_window.advance(range.start) >= range.end {
        return Err(WfsimError::invalid(
            "walkforward",
            "train_window",
            format!(
                "train_window {} leaves no room for evaluation in {}",
                train_window, range
            ),
        ));
    }

    let mut windows = Vec::new();
    for i in 0u32.. {
        let anchor = step.scaled(i).advance(range.start);
        let train_end = train_window.advance(anchor);
        if train_end >= range.end {
            break;
        }
        let train_start = match mode {
            SplitMode::Rolling => anchor,
            SplitMode::Anchored => range.start,
        };
        windows.push((train_start, train_end));
    }

    let mut splits = Vec::with_capacity(windows.len());
    for (i, &(train_start, train_end)) in windows.iter().enumerate() {
        // Month-end clamping can pull the next evaluation start a few days
        // earlier than this window's nominal end.
        let next_start = windows.get(i + 1).map_or(range.end, |&(_, next)| next);
        let eval_end = eval_window
            .advance(train_end)
            .min(range.end)
            .min(next_start);
        splits.push(WalkForwardSplit::new(
            i,
            TimeRange::new(train_start, train_end),
            TimeRange::new(train_end, eval_end),
        )?);
    }
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn rolling_six_month_splits() {
        let range = TimeRange::new(d(2020, 1, 1), d(2021, 7, 1));
        let splits = build_splits(
            range,
            WindowLength::Months(6),
            WindowLength::Months(6),
            WindowLength::Months(6),
            SplitMode::Rolling,
        )
        .unwrap();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].train, TimeRange::new(d(2020, 1, 1), d(2020, 7, 1)));
        assert_eq!(splits[0].eval, TimeRange::new(d(2020, 7, 1), d(2021, 1, 1)));
        assert_eq!(splits[1].train, TimeRange::new(d(2020, 7, 1), d(2021, 1, 1)));
        assert_eq!(splits[1].eval, TimeRange::new(d(2021, 1, 1), d(2021, 7, 1)));
        assert_eq!(splits[1].index, 1);
    }

    #[test]
    fn anchored_keeps_train_start() {
        let range = TimeRange::new(d(2020, 1, 1), d(2021, 1, 1));
        let splits = build_splits(
            range,
            WindowLength::Months(6),
            WindowLength::Months(3),
            WindowLength::Months(3),
            SplitMode::Anchored,
        )
        .unwrap();
        assert_eq!(splits.len(), 2);
        assert!(splits.iter().all(|s| s.train.start == d(2020, 1, 1)));
        assert_eq!(splits[1].train.end, d(2020, 10, 1));
    }

    #[test]
    fn last_eval_window_is_clipped() {
        let range = TimeRange::new(d(2020, 1, 1), d(2020, 5, 15));
        let splits = build_splits(
            range,
            WindowLength::Months(3),
            WindowLength::Months(2),
            WindowLength::Months(2),
            SplitMode::Rolling,
        )
        .unwrap();
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].eval.end, d(2020, 5, 15));
    }

    #[test]
    fn rejects_train_window_covering_range() {
        let range = TimeRange::new(d(2020, 1, 1), d(2020, 7, 1));
        let err = build_splits(
            range,
            WindowLength::Months(6),
            WindowLength::Months(1),
            WindowLength::Months(1),
            SplitMode::Rolling,
        )
        .unwrap_err();
        assert!(matches!(err, WfsimError::ConfigInvalid { ref key, .. } if key == "train_window"));
    }

    #[test]
    fn rejects_overlapping_eval_windows() {
        let range = TimeRange::new(d(2020, 1, 1), d(2022, 1, 1));
        assert!(
            build_splits(
                range,
                WindowLength::Months(6),
                WindowLength::Months(3),
                WindowLength::Days(30),
                SplitMode::Rolling,
            )
            .is_err()
        );
    }

    #[test]
    fn rejects_zero_windows() {
        let range = TimeRange::new(d(2020, 1, 1), d(2022, 1, 1));
        assert!(
            build_splits(
                range,
                WindowLength::Days(0),
                WindowLength::Months(3),
                WindowLength::Months(3),
                SplitMode::Rolling,
            )
            .is_err()
        );
    }

    #[test]
    fn month_end_clamping_never_overlaps_eval_windows() {
        let range = TimeRange::new(d(2019, 11, 30), d(2021, 1, 1));
        let splits = build_splits(
            range,
            WindowLength::Months(1),
            WindowLength::Months(3),
            WindowLength::Months(3),
            SplitMode::Rolling,
        )
        .unwrap();
        assert_eq!(splits[0].eval.start, d(2019, 12, 30));
        assert_eq!(splits[1].train.start, d(2020, 2, 29));
        assert_eq!(splits[1].eval.start, d(2020, 3, 29));
        assert_eq!(splits[0].eval.end, d(2020, 3, 29));
        for pair in splits.windows(2) {
            assert!(pair[0].eval.end <= pair[1].eval.start);
        }
    }

    #[test]
    fn split_constructor_enforces_ordering() {
        let train = TimeRange::new(d(2020, 1, 1), d(2020, 7, 1));
        let eval = TimeRange::new(d(2020, 6, 1), d(2020, 9, 1));
        assert!(WalkForwardSplit::new(0, train, eval).is_err());
    }

    #[test]
    fn parse_mode() {
        assert_eq!("Anchored".parse::<SplitMode>(), Ok(SplitMode::Anchored));
        assert!("sideways".parse::<SplitMode>().is_err());
    }
}
