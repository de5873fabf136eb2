//! Declarative feature descriptions and the pipeline contract.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use crate::domain::error::WfsimError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceColumn {
    Open,
    High,
    Low,
    Close,
    Volume,
    /// A named alternative-data column attached to the bar frame.
    Alt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Raw,
    PctChange,
    LogReturn,
    RollingMean,
    /// Rolling population std of one-period returns.
    Volatility,
    RollingZScore,
    Ema,
    Lag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    None,
    ZScore,
    Robust,
    MinMax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub source: SourceColumn,
    pub transform: Transform,
    pub window: usize,
    pub normalization: Normalization,
}

impl FeatureSpec {
    pub fn new(
        name: impl Into<String>,
        source: SourceColumn,
        transform: Transform,
        window: usize,
        normalization: Normalization,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            transform,
            window,
            normalization,
        }
    }

    /// Rows of history needed before the first defined value.
    pub fn lookback(&self) -> usize {
        match self.transform {
            Transform::Raw => 1,
            Transform::RollingMean | Transform::RollingZScore | Transform::Ema => self.window,
            Transform::PctChange | Transform::LogReturn | Transform::Volatility | Transform::Lag => {
                self.window + 1
            }
        }
    }

    /// Parse `name:source:transform:window:normalization`, e.g.
    /// `ret_5:close:pct_change:5:zscore` or `sent:alt=news:ema:3:none`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let parts: Vec<&str> = text.trim().split(':').map(str::trim).collect();
        if parts.len() != 5 {
            return Err(format!(
                "feature '{}' must have 5 fields name:source:transform:window:normalization",
                text.trim()
            ));
        }
        let source = match parts[1] {
            "open" => SourceColumn::Open,
            "high" => SourceColumn::High,
            "low" => SourceColumn::Low,
            "close" => SourceColumn::Close,
            "volume" => SourceColumn::Volume,
            other => match other.strip_prefix("alt=") {
                Some(name) if !name.is_empty() => SourceColumn::Alt(name.to_string()),
                _ => return Err(format!("unknown source column '{}'", other)),
            },
        };
        let transform = match parts[2] {
            "raw" => Transform::Raw,
            "pct_change" => Transform::PctChange,
            "log_return" => Transform::LogReturn,
            "rolling_mean" => Transform::RollingMean,
            "volatility" => Transform::Volatility,
            "zscore" => Transform::RollingZScore,
            "ema" => Transform::Ema,
            "lag" => Transform::Lag,
            other => return Err(format!("unknown transform '{}'", other)),
        };
        let window: usize = parts[3]
            .parse()
            .map_err(|_| format!("invalid window '{}'", parts[3]))?;
        let normalization = match parts[4] {
            "none" => Normalization::None,
            "zscore" => Normalization::ZScore,
            "robust" => Normalization::Robust,
            "minmax" => Normalization::MinMax,
            other => return Err(format!("unknown normalization '{}'", other)),
        };
        Ok(FeatureSpec::new(parts[0], source, transform, window, normalization))
    }
}

impl fmt::Display for FeatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            SourceColumn::Open => "open".to_string(),
            SourceColumn::High => "high".to_string(),
            SourceColumn::Low => "low".to_string(),
            SourceColumn::Close => "close".to_string(),
            SourceColumn::Volume => "volume".to_string(),
            SourceColumn::Alt(name) => format!("alt={}", name),
        };
        let transform = match self.transform {
            Transform::Raw => "raw",
            Transform::PctChange => "pct_change",
            Transform::LogReturn => "log_return",
            Transform::RollingMean => "rolling_mean",
            Transform::Volatility => "volatility",
            Transform::RollingZScore => "zscore",
            Transform::Ema => "ema",
            Transform::Lag => "lag",
        };
        let normalization = match self.normalization {
            Normalization::None => "none",
            Normalization::ZScore => "zscore",
            Normalization::Robust => "robust",
            Normalization::MinMax => "minmax",
        };
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.name, source, transform, self.window, normalization
        )
    }
}

/// Ordered feature specs plus a schema version. Any semantic change to a
/// spec must bump `schema_version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineContract {
    pub schema_version: String,
    pub min_fit_rows: usize,
    pub features: Vec<FeatureSpec>,
}

impl PipelineContract {
    pub fn new(
        schema_version: impl Into<String>,
        min_fit_rows: usize,
        features: Vec<FeatureSpec>,
    ) -> Self {
        Self {
            schema_version: schema_version.into(),
            min_fit_rows,
            features,
        }
    }

    pub fn validate(&self) -> Result<(), WfsimError> {
        if self.schema_version.trim().is_empty() {
            return Err(WfsimError::invalid(
                "pipeline",
                "schema_version",
                "schema_version must not be empty",
            ));
        }
        if self.features.is_empty() {
            return Err(WfsimError::invalid(
                "pipeline",
                "features",
                "at least one feature is required",
            ));
        }
        let mut seen = HashSet::new();
        for spec in &self.features {
            if !seen.insert(spec.name.as_str()) {
                return Err(WfsimError::invalid(
                    "pipeline",
                    "features",
                    format!("duplicate feature name {}", spec.name),
                ));
            }
            if spec.transform != Transform::Raw && spec.window == 0 {
                return Err(WfsimError::invalid(
                    "pipeline",
                    "features",
                    format!("feature {} needs a window of at least 1", spec.name),
                ));
            }
        }
        Ok(())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Largest lookback across all features; the minimum feature window.
    pub fn max_lookback(&self) -> usize {
        self.features.iter().map(FeatureSpec::lookback).max().unwrap_or(1)
    }

    /// SHA-256 over the ordered feature definitions.
    pub fn signature(&self) -> String {
        let body = self
            .features
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        hex::encode(Sha256::digest(body.as_bytes()))
    }
}
