#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use wfsim::domain::bar::{Bar, BarFrame};
use wfsim::domain::env::EnvConfig;
use wfsim::domain::error::WfsimError;
use wfsim::domain::feature::{
    FeatureFrame, FeatureRow, FeatureSpec, Normalization, PipelineContract, SourceColumn,
    Transform,
};
use wfsim::domain::range::TimeRange;
use wfsim::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, BarFrame>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_frame(mut self, frame: BarFrame) -> Self {
        self.data.insert(frame.symbol.clone(), frame);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, symbol: &str, range: Option<TimeRange>) -> Result<BarFrame, WfsimError> {
        let frame = self.data.get(symbol).ok_or_else(|| WfsimError::EmptyInput {
            reason: format!("no data for {}", symbol),
        })?;
        let bars = frame
            .bars()
            .iter()
            .filter(|b| range.is_none_or(|r| r.contains(b.date)))
            .cloned()
            .collect();
        BarFrame::new(symbol, bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, WfsimError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, date: NaiveDate, open: f64, close: f64) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        date,
        open,
        high: open.max(close) + 1.0,
        low: open.min(close) - 1.0,
        close,
        volume: 1_000.0,
    }
}

/// One bar per calendar day from `start`, open equal to the previous close.
pub fn frame_from_closes(symbol: &str, start: NaiveDate, closes: &[f64]) -> BarFrame {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            make_bar(symbol, start + Duration::days(i as i64), open, close)
        })
        .collect();
    BarFrame::new(symbol, bars).unwrap()
}

/// A gently trending, oscillating series covering `[start, end)` daily.
pub fn generate_frame(symbol: &str, start: NaiveDate, end: NaiveDate, seed: f64) -> BarFrame {
    let days = (end - start).num_days() as usize;
    let closes: Vec<f64> = (0..days)
        .map(|i| {
            let t = i as f64;
            100.0 + (t * 0.21 + seed).sin() * 4.0 + (t * 0.05).cos() * 2.0 + t * 0.02
        })
        .collect();
    frame_from_closes(symbol, start, &closes)
}

/// Feature frame with a single constant feature, for driving the
/// environment directly with chosen prices.
pub fn feature_frame(prices: &[(f64, f64)]) -> Arc<FeatureFrame> {
    let start = date(2024, 1, 1);
    let rows = prices
        .iter()
        .enumerate()
        .map(|(i, &(open, close))| FeatureRow {
            bar: make_bar("TEST", start + Duration::days(i as i64), open, close),
            values: vec![0.0],
        })
        .collect();
    Arc::new(FeatureFrame::new("TEST", vec!["signal".to_string()], rows))
}

pub fn sample_contract() -> PipelineContract {
    PipelineContract::new(
        "v1",
        10,
        vec![
            FeatureSpec::new(
                "ret_1",
                SourceColumn::Close,
                Transform::PctChange,
                1,
                Normalization::ZScore,
            ),
            FeatureSpec::new(
                "vol_10",
                SourceColumn::Close,
                Transform::Volatility,
                10,
                Normalization::Robust,
            ),
        ],
    )
}

pub fn costless_env() -> EnvConfig {
    EnvConfig {
        commission_bps: 0.0,
        slippage_bps: 0.0,
        ..EnvConfig::default()
    }
}
