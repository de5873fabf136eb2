//! Fit/transform split of the feature pipeline.
//!
//! `fit` learns scaling statistics from rows inside a time range only;
//! `transform` replays a fitted scaler without mutating anything. The same
//! `(contract, scaler)` pair therefore produces identical features during
//! training, evaluation and live inference.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::bar::{Bar, BarFrame};
use crate::domain::error::WfsimError;
use crate::domain::range::TimeRange;

use super::scaler::{ColumnStats, FittedScaler, ScalerColumn};
use super::spec::PipelineContract;
use super::transform as transforms;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub bar: Bar,
    pub values: Vec<f64>,
}

impl FeatureRow {
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// One row per input bar. Rows whose rolling window is not yet full carry
/// `NaN`; callers mask them with [`FeatureFrame::drop_incomplete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub symbol: String,
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn new(symbol: impl Into<String>, columns: Vec<String>, rows: Vec<FeatureRow>) -> Self {
        Self {
            symbol: symbol.into(),
            columns,
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&FeatureRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn incomplete_rows(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_complete()).count()
    }

    /// Drop rows with any non-finite value.
    pub fn drop_incomplete(mut self) -> Self {
        self.rows.retain(FeatureRow::is_complete);
        self
    }

    /// Keep only rows whose bar date lies inside `range`.
    pub fn restrict(mut self, range: &TimeRange) -> Self {
        self.rows.retain(|r| range.contains(r.bar.date));
        self
    }
}

/// Learn scaling statistics from rows inside `range`. Feature values are
/// computed from bars strictly before `range.end`, so nothing at or after
/// the end of the training window can influence the statistics.
pub fn fit(
    frame: &BarFrame,
    contract: &PipelineContract,
    range: TimeRange,
) -> Result<FittedScaler, WfsimError> {
    contract.validate()?;
    let history = frame.before(range.end);
    let minimum = contract.min_fit_rows.max(1);

    let mut columns = Vec::with_capacity(contract.features.len());
    for spec in &contract.features {
        let raw = transforms::compute(&history, spec)?;
        let sample: Vec<f64> = history
            .bars()
            .iter()
            .zip(&raw)
            .filter(|(bar, v)| range.contains(bar.date) && v.is_finite())
            .map(|(_, v)| *v)
            .collect();

        if sample.len() < minimum {
            return Err(WfsimError::InsufficientData {
                feature: spec.name.clone(),
                rows: sample.len(),
                minimum,
            });
        }

        columns.push(ScalerColumn {
            name: spec.name.clone(),
            stats: ColumnStats::fit(&sample, spec.normalization),
        });
    }

    debug!(
        symbol = %frame.symbol,
        range = %range,
        features = columns.len(),
        "fitted feature scaler"
    );

    Ok(FittedScaler {
        schema_version: contract.schema_version.clone(),
        signature: contract.signature(),
        columns,
    })
}

/// Apply every feature spec, then scale with `scaler`. Deterministic and
/// side-effect free.
pub fn transform(
    frame: &BarFrame,
    contract: &PipelineContract,
    scaler: &FittedScaler,
) -> Result<FeatureFrame, WfsimError> {
    let expected = contract.signature();
    if scaler.signature != expected {
        return Err(WfsimError::SignatureMismatch {
            expected,
            found: scaler.signature.clone(),
        });
    }

    let mut scaled_columns = Vec::with_capacity(contract.features.len());
    for spec in &contract.features {
        let stats = scaler
            .get(&spec.name)
            .ok_or_else(|| WfsimError::MalformedArtifact {
                reason: format!("scaler has no statistics for feature {}", spec.name),
            })?;
        let raw = transforms::compute(frame, spec)?;
        scaled_columns.push(raw.into_iter().map(|v| stats.apply(v)).collect::<Vec<_>>());
    }

    let rows = frame
        .bars()
        .iter()
        .enumerate()
        .map(|(i, bar)| FeatureRow {
            bar: bar.clone(),
            values: scaled_columns.iter().map(|col| col[i]).collect(),
        })
        .collect();

    Ok(FeatureFrame::new(
        frame.symbol.clone(),
        contract.column_names(),
        rows,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feature::spec::{FeatureSpec, Normalization, SourceColumn, Transform};
    use chrono::{Duration, NaiveDate};

    fn frame(closes: &[f64]) -> BarFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                symbol: "SPY".into(),
                date: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 100.0,
            })
            .collect();
        BarFrame::new("SPY", bars).unwrap()
    }

    fn contract(min_rows: usize) -> PipelineContract {
        PipelineContract::new(
            "v1",
            min_rows,
            vec![
                FeatureSpec::new(
                    "ret_1",
                    SourceColumn::Close,
                    Transform::PctChange,
                    1,
                    Normalization::ZScore,
                ),
                FeatureSpec::new(
                    "close",
                    SourceColumn::Close,
                    Transform::Raw,
                    1,
                    Normalization::MinMax,
                ),
            ],
        )
    }

    fn range(from: u32, to: u32) -> TimeRange {
        TimeRange::new(
            NaiveDate::from_ymd_opt(2024, 1, from).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, to).unwrap(),
        )
    }

    #[test]
    fn fit_ignores_rows_outside_range() {
        let f = frame(&[10.0, 11.0, 12.0, 13.0, 1000.0]);
        let scaler = fit(&f, &contract(2), range(1, 5)).unwrap();
        assert_eq!(
            scaler.get("close"),
            Some(&ColumnStats::MinMax {
                min: 10.0,
                span: 3.0
            })
        );
    }

    #[test]
    fn fit_fails_on_insufficient_rows() {
        let f = frame(&[10.0, 11.0, 12.0]);
        let err = fit(&f, &contract(5), range(1, 4)).unwrap_err();
        assert!(matches!(
            err,
            WfsimError::InsufficientData { ref feature, rows: 2, minimum: 5 } if feature == "ret_1"
        ));
    }

    #[test]
    fn transform_marks_warmup_as_nan() {
        let f = frame(&[10.0, 11.0, 12.0, 13.0]);
        let scaler = fit(&f, &contract(2), range(1, 5)).unwrap();
        let out = transform(&f, &contract(2), &scaler).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.rows()[0].values[0].is_nan());
        assert_eq!(out.incomplete_rows(), 1);
        assert_eq!(out.drop_incomplete().len(), 3);
    }

    #[test]
    fn transform_is_idempotent() {
        let f = frame(&[10.0, 11.0, 10.5, 12.0, 12.5, 11.0]);
        let c = contract(2);
        let scaler = fit(&f, &c, range(1, 5)).unwrap();
        let a = transform(&f, &c, &scaler).unwrap();
        let b = transform(&f, &c, &scaler).unwrap();
        assert_eq!(a.rows().len(), b.rows().len());
        for (x, y) in a.rows().iter().zip(b.rows()) {
            for (u, v) in x.values.iter().zip(&y.values) {
                assert!(u.to_bits() == v.to_bits());
            }
        }
    }

    #[test]
    fn transform_rejects_foreign_scaler() {
        let f = frame(&[10.0, 11.0, 12.0, 13.0]);
        let scaler = fit(&f, &contract(2), range(1, 5)).unwrap();
        let mut other = contract(2);
        other.features[0].window = 2;
        assert!(matches!(
            transform(&f, &other, &scaler),
            Err(WfsimError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn restrict_keeps_range_rows() {
        let f = frame(&[10.0, 11.0, 12.0, 13.0]);
        let scaler = fit(&f, &contract(1), range(1, 5)).unwrap();
        let out = transform(&f, &contract(1), &scaler)
            .unwrap()
            .restrict(&range(2, 4));
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0].bar.close, 11.0);
    }
}
