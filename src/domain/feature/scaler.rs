//! Per-feature location/scale statistics learned on a training window.

use serde::{Deserialize, Serialize};

use super::spec::Normalization;
use super::transform::mean_std;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnStats {
    Identity,
    ZScore { mean: f64, std: f64 },
    Robust { median: f64, iqr: f64 },
    MinMax { min: f64, span: f64 },
}

impl ColumnStats {
    /// Fit on finite values only. A zero scale falls back to 1.0 so a
    /// constant training column maps to a constant, not to infinity.
    pub fn fit(values: &[f64], mode: Normalization) -> Self {
        match mode {
            Normalization::None => ColumnStats::Identity,
            Normalization::ZScore => {
                let (mean, std) = mean_std(values);
                ColumnStats::ZScore {
                    mean,
                    std: nonzero(std),
                }
            }
            Normalization::Robust => {
                let sorted = sorted(values);
                let q1 = quantile(&sorted, 0.25);
                let q3 = quantile(&sorted, 0.75);
                ColumnStats::Robust {
                    median: quantile(&sorted, 0.5),
                    iqr: nonzero(q3 - q1),
                }
            }
            Normalization::MinMax => {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                ColumnStats::MinMax {
                    min,
                    span: nonzero(max - min),
                }
            }
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            ColumnStats::Identity => value,
            ColumnStats::ZScore { mean, std } => (value - mean) / std,
            ColumnStats::Robust { median, iqr } => (value - median) / iqr,
            ColumnStats::MinMax { min, span } => (value - min) / span,
        }
    }

    pub fn approx_eq(&self, other: &ColumnStats, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        match (self, other) {
            (ColumnStats::Identity, ColumnStats::Identity) => true,
            (ColumnStats::ZScore { mean: a, std: b }, ColumnStats::ZScore { mean: c, std: d }) => {
                close(*a, *c) && close(*b, *d)
            }
            (
                ColumnStats::Robust { median: a, iqr: b },
                ColumnStats::Robust { median: c, iqr: d },
            ) => close(*a, *c) && close(*b, *d),
            (ColumnStats::MinMax { min: a, span: b }, ColumnStats::MinMax { min: c, span: d }) => {
                close(*a, *c) && close(*b, *d)
            }
            _ => false,
        }
    }
}

fn nonzero(scale: f64) -> f64 {
    if scale == 0.0 || !scale.is_finite() {
        1.0
    } else {
        scale
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Linear-interpolated quantile of a sorted slice.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerColumn {
    pub name: String,
    pub stats: ColumnStats,
}

/// Fitted normalization state. Read-only once `fit` returns; it records the
/// contract signature it was fitted under so it cannot be replayed against
/// a different feature definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedScaler {
    pub schema_version: String,
    pub signature: String,
    pub columns: Vec<ScalerColumn>,
}

impl FittedScaler {
    pub fn get(&self, name: &str) -> Option<&ColumnStats> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.stats)
    }

    pub fn approx_eq(&self, other: &FittedScaler, tolerance: f64) -> bool {
        self.schema_version == other.schema_version
            && self.signature == other.signature
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name && a.stats.approx_eq(&b.stats, tolerance))
    }
}
