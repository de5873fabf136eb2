//! Per-split status and the aggregate walk-forward report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::backtest::BacktestResult;
use crate::domain::env::Trade;

use super::monte_carlo::MonteCarloDistribution;
use super::split::WalkForwardSplit;

/// Relative Sharpe loss from training to evaluation above which a split is
/// flagged as overfit.
pub const OVERFIT_DEGRADATION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitStatus {
    Ok,
    SkippedInsufficientData { bars: usize, required: usize },
    Failed { cause: String },
}

impl SplitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SplitStatus::Ok => "OK",
            SplitStatus::SkippedInsufficientData { .. } => "SKIPPED_INSUFFICIENT_DATA",
            SplitStatus::Failed { .. } => "FAILED",
        }
    }
}

/// Where the pipeline and policy behind a result were persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRefs {
    pub pipeline: String,
    pub weights: Option<String>,
}

/// The frozen policy replayed over its own training window, compared with
/// the evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InSampleCheck {
    pub metrics: BTreeMap<String, f64>,
    /// `(train - eval) / train` Sharpe; `0.0` when the training Sharpe is
    /// not positive.
    pub sharpe_degradation: f64,
    pub overfit: bool,
}

impl InSampleCheck {
    pub fn new(train: BTreeMap<String, f64>, eval: &BTreeMap<String, f64>) -> Self {
        let train_sharpe = train.get("sharpe_ratio").copied().unwrap_or(0.0);
        let eval_sharpe = eval.get("sharpe_ratio").copied().unwrap_or(0.0);
        let sharpe_degradation = if train_sharpe > 0.0 {
            (train_sharpe - eval_sharpe) / train_sharpe
        } else {
            0.0
        };
        InSampleCheck {
            metrics: train,
            sharpe_degradation,
            overfit: sharpe_degradation > OVERFIT_DEGRADATION,
        }
    }

    pub fn sharpe(&self) -> f64 {
        self.metrics.get("sharpe_ratio").copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitReport {
    pub split: WalkForwardSplit,
    pub status: SplitStatus,
    pub result: Option<BacktestResult>,
    pub in_sample: Option<InSampleCheck>,
    pub artifacts: Option<ArtifactRefs>,
}

impl SplitReport {
    pub fn skipped(split: WalkForwardSplit, bars: usize, required: usize) -> Self {
        SplitReport {
            split,
            status: SplitStatus::SkippedInsufficientData { bars, required },
            result: None,
            in_sample: None,
            artifacts: None,
        }
    }

    pub fn failed(split: WalkForwardSplit, cause: impl Into<String>) -> Self {
        SplitReport {
            split,
            status: SplitStatus::Failed {
                cause: cause.into(),
            },
            result: None,
            in_sample: None,
            artifacts: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
    pub mean_sharpe: f64,
    pub median_sharpe: f64,
    pub mean_total_return: f64,
    pub total_trades: usize,
    pub mean_train_sharpe: f64,
    /// `1 - mean eval Sharpe / mean train Sharpe` over splits with an
    /// in-sample check; `0.0` when the mean train Sharpe is not positive.
    pub sharpe_degradation: f64,
    pub overfit_splits: usize,
}

impl Aggregate {
    pub fn from_splits(splits: &[SplitReport]) -> Self {
        let mut agg = Aggregate::default();
        let mut sharpes = Vec::new();
        let mut returns = Vec::new();
        let mut paired_train = Vec::new();
        let mut paired_eval = Vec::new();
        for report in splits {
            match report.status {
                SplitStatus::Ok => agg.ok += 1,
                SplitStatus::SkippedInsufficientData { .. } => agg.skipped += 1,
                SplitStatus::Failed { .. } => agg.failed += 1,
            }
            if let Some(result) = &report.result {
                agg.total_trades += result.trades.len();
                if let Some(s) = result.metric("sharpe_ratio") {
                    sharpes.push(s);
                }
                if let Some(r) = result.metric("total_return") {
                    returns.push(r);
                }
                if let Some(check) = &report.in_sample {
                    paired_train.push(check.sharpe());
                    paired_eval.push(result.metric("sharpe_ratio").unwrap_or(0.0));
                    if check.overfit {
                        agg.overfit_splits += 1;
                    }
                }
            }
        }
        agg.mean_train_sharpe = mean(&paired_train);
        if agg.mean_train_sharpe > 0.0 {
            agg.sharpe_degradation = 1.0 - mean(&paired_eval) / agg.mean_train_sharpe;
        }
        agg.mean_sharpe = mean(&sharpes);
        agg.median_sharpe = median(&mut sharpes);
        agg.mean_total_return = mean(&returns);
        agg
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Outcome of a walk-forward run for one symbol. Every generated split is
/// listed, whatever its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub symbol: String,
    pub strategy: String,
    pub schema_version: String,
    pub splits: Vec<SplitReport>,
    /// Set when the run was cancelled before every split was processed.
    pub partial: bool,
    pub aggregate: Aggregate,
}

impl WalkForwardReport {
    pub fn new(
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        schema_version: impl Into<String>,
        splits: Vec<SplitReport>,
        partial: bool,
    ) -> Self {
        let aggregate = Aggregate::from_splits(&splits);
        WalkForwardReport {
            symbol: symbol.into(),
            strategy: strategy.into(),
            schema_version: schema_version.into(),
            splits,
            partial,
            aggregate,
        }
    }

    pub fn results(&self) -> impl Iterator<Item = &BacktestResult> {
        self.splits.iter().filter_map(|s| s.result.as_ref())
    }

    /// Evaluation trades from every completed split, in chronological order.
    pub fn stitched_trades(&self) -> Vec<Trade> {
        self.results().flat_map(|r| r.trades.iter().cloned()).collect()
    }
}

/// Everything a run hands to the reporting side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub reports: Vec<WalkForwardReport>,
    /// Monte Carlo distribution of each symbol's stitched evaluation trades.
    pub monte_carlo: BTreeMap<String, MonteCarloDistribution>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::range::TimeRange;
    use chrono::NaiveDate;

    fn split(index: usize) -> WalkForwardSplit {
        let d = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
        WalkForwardSplit::new(
            index,
            TimeRange::new(d(1), d(2)),
            TimeRange::new(d(2), d(3)),
        )
        .unwrap()
    }

    fn ok(index: usize, sharpe: f64) -> SplitReport {
        let s = split(index);
        let mut metrics = BTreeMap::new();
        metrics.insert("sharpe_ratio".to_string(), sharpe);
        metrics.insert("total_return".to_string(), 0.1);
        SplitReport {
            split: s,
            status: SplitStatus::Ok,
            result: Some(BacktestResult {
                strategy: "hold".into(),
                symbol: "T".into(),
                split_index: index,
                eval_range: s.eval,
                equity_curve: vec![],
                trades: vec![],
                metrics,
                total_reward: 0.0,
                shield_overrides: 0,
                invalid_actions: 0,
            }),
            in_sample: None,
            artifacts: None,
        }
    }

    fn sharpe_map(sharpe: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([("sharpe_ratio".to_string(), sharpe)])
    }

    #[test]
    fn overfit_when_sharpe_more_than_halves() {
        let check = InSampleCheck::new(sharpe_map(2.0), &sharpe_map(0.8));
        assert!((check.sharpe_degradation - 0.6).abs() < 1e-12);
        assert!(check.overfit);

        let check = InSampleCheck::new(sharpe_map(2.0), &sharpe_map(1.2));
        assert!((check.sharpe_degradation - 0.4).abs() < 1e-12);
        assert!(!check.overfit);
    }

    #[test]
    fn non_positive_train_sharpe_is_never_overfit() {
        let check = InSampleCheck::new(sharpe_map(-0.5), &sharpe_map(-3.0));
        assert_eq!(check.sharpe_degradation, 0.0);
        assert!(!check.overfit);
    }

    #[test]
    fn aggregate_tracks_in_sample_degradation() {
        let mut first = ok(0, 0.5);
        first.in_sample = Some(InSampleCheck::new(sharpe_map(2.0), &sharpe_map(0.5)));
        let mut second = ok(1, 1.5);
        second.in_sample = Some(InSampleCheck::new(sharpe_map(2.0), &sharpe_map(1.5)));
        let report = WalkForwardReport::new("T", "hold", "v1", vec![first, second], false);
        assert_eq!(report.aggregate.overfit_splits, 1);
        assert!((report.aggregate.mean_train_sharpe - 2.0).abs() < 1e-12);
        assert!((report.aggregate.sharpe_degradation - 0.5).abs() < 1e-12);
    }

    #[test]
    fn aggregate_counts_every_status() {
        let splits = vec![
            ok(0, 1.0),
            SplitReport::skipped(split(1), 3, 20),
            SplitReport::failed(split(2), "boom"),
            ok(3, 3.0),
            ok(4, 0.5),
        ];
        let report = WalkForwardReport::new("T", "hold", "v1", splits, false);
        assert_eq!(report.aggregate.ok, 3);
        assert_eq!(report.aggregate.skipped, 1);
        assert_eq!(report.aggregate.failed, 1);
        assert!((report.aggregate.mean_sharpe - 1.5).abs() < 1e-12);
        assert!((report.aggregate.median_sharpe - 1.0).abs() < 1e-12);
        assert_eq!(report.results().count(), 3);
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_string(&SplitStatus::SkippedInsufficientData {
            bars: 3,
            required: 20,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"status":"SKIPPED_INSUFFICIENT_DATA","bars":3,"required":20}"#
        );
        assert_eq!(SplitStatus::Ok.label(), "OK");
    }
}
