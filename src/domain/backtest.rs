//! Episode driver and per-split backtest result.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::env::{EquityPoint, MarketEnv, Trade};
use super::error::WfsimError;
use super::feature::FeatureFrame;
use super::metrics::{Metrics, MetricsConfig};
use super::policy::Strategy;
use super::range::TimeRange;

/// Raw output of one pass of a policy over a feature frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub total_reward: f64,
    pub steps: usize,
    pub shield_overrides: usize,
    pub invalid_actions: usize,
}

/// Step `strategy` through `frame` until the environment terminates. The
/// strategy only ever sees the observation the environment hands back.
pub fn run_episode(
    env: &mut MarketEnv,
    strategy: &dyn Strategy,
    frame: Arc<FeatureFrame>,
) -> Result<Episode, WfsimError> {
    let mut observation = env.reset(frame)?;
    let mut total_reward = 0.0;
    let mut steps = 0;
    let mut shield_overrides = 0;
    let mut invalid_actions = 0;

    loop {
        let outcome = env.step(strategy.act(&observation))?;
        steps += 1;
        total_reward += outcome.reward;
        if outcome.info.shield_override {
            shield_overrides += 1;
        }
        if outcome.info.invalid_action {
            invalid_actions += 1;
        }
        if outcome.terminated {
            break;
        }
        observation = outcome.observation;
    }

    Ok(Episode {
        equity_curve: env.equity_curve().to_vec(),
        trades: env.trades().to_vec(),
        total_reward,
        steps,
        shield_overrides,
        invalid_actions,
    })
}

/// Immutable evaluation result for one (strategy, split) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub symbol: String,
    pub split_index: usize,
    pub eval_range: TimeRange,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub metrics: BTreeMap<String, f64>,
    pub total_reward: f64,
    pub shield_overrides: usize,
    pub invalid_actions: usize,
}

impl BacktestResult {
    pub fn from_episode(
        strategy: impl Into<String>,
        symbol: impl Into<String>,
        split_index: usize,
        eval_range: TimeRange,
        episode: Episode,
        metrics_config: &MetricsConfig,
    ) -> Self {
        let metrics =
            Metrics::compute(&episode.equity_curve, &episode.trades, metrics_config).to_map();
        BacktestResult {
            strategy: strategy.into(),
            symbol: symbol.into(),
            split_index,
            eval_range,
            equity_curve: episode.equity_curve,
            trades: episode.trades,
            metrics,
            total_reward: episode.total_reward,
            shield_overrides: episode.shield_overrides,
            invalid_actions: episode.invalid_actions,
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}
