//! Trade-ledger resampling for robustness bounds.
//!
//! Each resample draws its own ChaCha8 stream from the configured seed, so
//! the distribution does not depend on how rayon schedules the work.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::env::Trade;
use crate::domain::error::WfsimError;
use crate::domain::feature::scaler::quantile;

/// Equity below this fraction of the start counts as ruin.
pub const RUIN_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub num_resamples: usize,
    /// `None` or `Some(1)` draws trades independently; larger blocks keep
    /// runs of consecutive trades together (circular block bootstrap).
    pub block_size: Option<usize>,
    pub seed: u64,
    pub starting_equity: f64,
    /// Central mass of the reported interval, e.g. 0.95.
    pub confidence: f64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            num_resamples: 1_000,
            block_size: None,
            seed: 42,
            starting_equity: 10_000.0,
            confidence: 0.95,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), WfsimError> {
        if self.num_resamples == 0 {
            return Err(WfsimError::invalid(
                "montecarlo",
                "resamples",
                "resamples must be at least 1",
            ));
        }
        if self.block_size == Some(0) {
            return Err(WfsimError::invalid(
                "montecarlo",
                "block_size",
                "block_size must be at least 1",
            ));
        }
        if !(self.starting_equity > 0.0) {
            return Err(WfsimError::invalid(
                "montecarlo",
                "starting_equity",
                "starting_equity must be positive",
            ));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(WfsimError::invalid(
                "montecarlo",
                "confidence",
                "confidence must be in (0, 1)",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResampleOutcome {
    pub final_equity: f64,
    pub total_return: f64,
    /// Mean over standard deviation of per-trade returns, not annualized.
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub ruined: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Summary {
    fn from_values(mut values: Vec<f64>, confidence: f64) -> Self {
        if values.is_empty() {
            return Summary::default();
        }
        values.sort_by(f64::total_cmp);
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let tail = (1.0 - confidence) / 2.0;
        Summary {
            mean,
            median: quantile(&values, 0.5),
            std: var.sqrt(),
            lower: quantile(&values, tail),
            upper: quantile(&values, 1.0 - tail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloDistribution {
    pub resamples: usize,
    pub trades: usize,
    pub block_size: usize,
    pub seed: u64,
    pub confidence: f64,
    pub final_equity: Summary,
    pub total_return: Summary,
    pub sharpe: Summary,
    pub max_drawdown: Summary,
    pub prob_loss: f64,
    pub prob_ruin: f64,
}

impl MonteCarloDistribution {
    fn empty(trades: usize, config: &MonteCarloConfig) -> Self {
        MonteCarloDistribution {
            resamples: 0,
            trades,
            block_size: config.block_size.unwrap_or(1),
            seed: config.seed,
            confidence: config.confidence,
            final_equity: Summary::default(),
            total_return: Summary::default(),
            sharpe: Summary::default(),
            max_drawdown: Summary::default(),
            prob_loss: 0.0,
            prob_ruin: 0.0,
        }
    }

    fn from_outcomes(outcomes: &[ResampleOutcome], trades: usize, config: &MonteCarloConfig) -> Self {
        let n = outcomes.len() as f64;
        let summarize = |f: fn(&ResampleOutcome) -> f64| {
            Summary::from_values(outcomes.iter().map(f).collect(), config.confidence)
        };
        MonteCarloDistribution {
            resamples: outcomes.len(),
            trades,
            block_size: config.block_size.unwrap_or(1),
            seed: config.seed,
            confidence: config.confidence,
            final_equity: summarize(|o| o.final_equity),
            total_return: summarize(|o| o.total_return),
            sharpe: summarize(|o| o.sharpe),
            max_drawdown: summarize(|o| o.max_drawdown),
            prob_loss: outcomes.iter().filter(|o| o.total_return < 0.0).count() as f64 / n,
            prob_ruin: outcomes.iter().filter(|o| o.ruined).count() as f64 / n,
        }
    }
}

/// Resample the net P&L of `trades`. Fewer than two trades cannot produce
/// a meaningful distribution and yield an empty one.
pub fn monte_carlo(
    trades: &[Trade],
    config: &MonteCarloConfig,
) -> Result<MonteCarloDistribution, WfsimError> {
    config.validate()?;
    if trades.len() < 2 {
        debug!(trades = trades.len(), "too few trades for monte carlo");
        return Ok(MonteCarloDistribution::empty(trades.len(), config));
    }

    let pnls: Vec<f64> = trades.iter().map(|t| t.net_pnl).collect();
    let block = config.block_size.unwrap_or(1).min(pnls.len());

    let outcomes: Vec<ResampleOutcome> = (0..config.num_resamples)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
            rng.set_stream(i as u64);
            let path = resample(&pnls, block, &mut rng);
            evaluate(&path, config.starting_equity)
        })
        .collect();

    Ok(MonteCarloDistribution::from_outcomes(
        &outcomes,
        trades.len(),
        config,
    ))
}

fn resample(pnls: &[f64], block: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let n = pnls.len();
    let mut path = Vec::with_capacity(n + block);
    while path.len() < n {
        let start = rng.gen_range(0..n);
        for offset in 0..block {
            path.push(pnls[(start + offset) % n]);
        }
    }
    path.truncate(n);
    path
}

fn evaluate(path: &[f64], starting_equity: f64) -> ResampleOutcome {
    let mut equity = starting_equity;
    let mut peak = starting_equity;
    let mut max_drawdown = 0.0_f64;
    let mut ruined = false;
    let mut returns = Vec::with_capacity(path.len());

    for pnl in path {
        returns.push(if equity > 0.0 { pnl / equity } else { 0.0 });
        equity += pnl;
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_drawdown = max_drawdown.max(((peak - equity) / peak).min(1.0));
        }
        if equity < starting_equity * RUIN_FRACTION {
            ruined = true;
        }
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let std = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();

    ResampleOutcome {
        final_equity: equity,
        total_return: equity / starting_equity - 1.0,
        sharpe: if std > 1e-12 { mean / std } else { 0.0 },
        max_drawdown,
        ruined,
    }
}
