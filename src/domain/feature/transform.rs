//! Causal column transforms.
//!
//! Every function returns one value per input row. Rows whose window is not
//! yet full are `NaN`; nothing is zero-filled. Value `i` only reads inputs
//! `0..=i`.

use crate::domain::bar::BarFrame;
use crate::domain::error::WfsimError;

use super::spec::{FeatureSpec, SourceColumn, Transform};

pub fn source_values(frame: &BarFrame, source: &SourceColumn) -> Result<Vec<f64>, WfsimError> {
    let bars = frame.bars();
    let values = match source {
        SourceColumn::Open => bars.iter().map(|b| b.open).collect(),
        SourceColumn::High => bars.iter().map(|b| b.high).collect(),
        SourceColumn::Low => bars.iter().map(|b| b.low).collect(),
        SourceColumn::Close => bars.iter().map(|b| b.close).collect(),
        SourceColumn::Volume => bars.iter().map(|b| b.volume).collect(),
        SourceColumn::Alt(name) => frame
            .column(name)
            .ok_or_else(|| WfsimError::MissingColumn {
                column: name.clone(),
            })?
            .to_vec(),
    };
    Ok(values)
}

/// Unscaled feature column for `spec`.
pub fn compute(frame: &BarFrame, spec: &FeatureSpec) -> Result<Vec<f64>, WfsimError> {
    let x = source_values(frame, &spec.source)?;
    let n = spec.window;
    let out = match spec.transform {
        Transform::Raw => x,
        Transform::PctChange => pct_change(&x, n),
        Transform::LogReturn => log_return(&x, n),
        Transform::RollingMean => rolling_mean(&x, n),
        Transform::Volatility => volatility(&x, n),
        Transform::RollingZScore => rolling_zscore(&x, n),
        Transform::Ema => ema(&x, n),
        Transform::Lag => lag(&x, n),
    };
    Ok(out.into_iter().map(finite_or_nan).collect())
}

fn finite_or_nan(v: f64) -> f64 {
    if v.is_finite() { v } else { f64::NAN }
}

pub fn pct_change(x: &[f64], periods: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            if periods == 0 || i < periods {
                f64::NAN
            } else {
                x[i] / x[i - periods] - 1.0
            }
        })
        .collect()
}

pub fn log_return(x: &[f64], periods: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            if periods == 0 || i < periods {
                f64::NAN
            } else {
                (x[i] / x[i - periods]).ln()
            }
        })
        .collect()
}

pub fn lag(x: &[f64], periods: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| if i < periods { f64::NAN } else { x[i - periods] })
        .collect()
}

pub fn rolling_mean(x: &[f64], window: usize) -> Vec<f64> {
    rolling(x, window, |w| mean_std(w).0)
}

pub fn rolling_zscore(x: &[f64], window: usize) -> Vec<f64> {
    rolling(x, window, |w| {
        let (mean, std) = mean_std(w);
        let last = w[w.len() - 1];
        if std > 0.0 { (last - mean) / std } else { 0.0 }
    })
}

pub fn volatility(x: &[f64], window: usize) -> Vec<f64> {
    let returns = pct_change(x, 1);
    rolling(&returns, window, |w| mean_std(w).1)
}

/// k = 2/(n+1), seeded with the SMA of the first n values. A non-finite
/// input breaks the average; it reseeds once `span` finite values follow.
pub fn ema(x: &[f64], span: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    if span == 0 {
        return out;
    }
    let k = 2.0 / (span as f64 + 1.0);
    let mut value: Option<f64> = None;
    let mut run = 0;
    for (i, &v) in x.iter().enumerate() {
        if !v.is_finite() {
            value = None;
            run = 0;
            continue;
        }
        run += 1;
        value = match value {
            Some(prev) => Some(v * k + prev * (1.0 - k)),
            None if run >= span => Some(x[i + 1 - span..=i].iter().sum::<f64>() / span as f64),
            None => None,
        };
        if let Some(current) = value {
            out[i] = current;
        }
    }
    out
}

fn rolling(x: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return f64::NAN;
            }
            let w = &x[i + 1 - window..=i];
            if w.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                f(w)
            }
        })
        .collect()
}

/// Population mean and standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
