//! Configuration loading and validation.
//!
//! Every section is read into an immutable config value and validated
//! before any computation starts. Absent keys take their documented
//! defaults; present but unparseable values are errors, never defaults.

use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::env::{EnvConfig, RewardWeights};
use crate::domain::error::WfsimError;
use crate::domain::feature::{FeatureSpec, PipelineContract};
use crate::domain::metrics::MetricsConfig;
use crate::domain::policy::{LinearQParams, StrategyConfig, StrategyKind};
use crate::domain::range::{TimeRange, WindowLength};
use crate::domain::walkforward::{MonteCarloConfig, SplitMode, WalkForwardConfig};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_MIN_FIT_ROWS: usize = 20;

/// Every validated section of one configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub env: EnvConfig,
    pub walkforward: WalkForwardConfig,
    pub pipeline: PipelineContract,
    pub strategy: StrategyConfig,
    pub metrics: MetricsConfig,
    pub monte_carlo: MonteCarloConfig,
}

pub fn load_simulation_config(config: &dyn ConfigPort) -> Result<SimulationConfig, WfsimError> {
    let env = load_env_config(config)?;
    let walkforward = load_walkforward_config(config)?;
    let pipeline = load_pipeline_contract(config)?;
    let strategy = load_strategy_config(config)?;
    validate_strategy_against_pipeline(&strategy, &pipeline)?;
    let metrics = load_metrics_config(config)?;
    let monte_carlo = load_monte_carlo_config(config, env.starting_cash)?;
    Ok(SimulationConfig {
        env,
        walkforward,
        pipeline,
        strategy,
        metrics,
        monte_carlo,
    })
}

pub fn load_env_config(config: &dyn ConfigPort) -> Result<EnvConfig, WfsimError> {
    let defaults = EnvConfig::default();
    let s = "environment";
    let env = EnvConfig {
        starting_cash: value_or(config, s, "starting_cash", defaults.starting_cash)?,
        commission_bps: value_or(config, s, "commission_bps", defaults.commission_bps)?,
        slippage_bps: value_or(config, s, "slippage_bps", defaults.slippage_bps)?,
        position_fraction: value_or(config, s, "position_fraction", defaults.position_fraction)?,
        allow_shorting: config.get_bool(s, "allow_shorting", defaults.allow_shorting),
        stop_loss_pct: value_or(config, s, "stop_loss_pct", defaults.stop_loss_pct)?,
        take_profit_pct: value_or(config, s, "take_profit_pct", defaults.take_profit_pct)?,
        max_trade_drawdown: value_or(
            config,
            s,
            "max_trade_drawdown",
            defaults.max_trade_drawdown,
        )?,
        liquidation_floor: value_or(config, s, "liquidation_floor", defaults.liquidation_floor)?,
        price_decimals: value_or(config, s, "price_decimals", defaults.price_decimals)?,
        reward: load_reward_weights(config)?,
    };
    env.validate()?;
    Ok(env)
}

pub fn load_reward_weights(config: &dyn ConfigPort) -> Result<RewardWeights, WfsimError> {
    let d = RewardWeights::default();
    let s = "reward";
    Ok(RewardWeights {
        equity_change: value_or(config, s, "equity_change", d.equity_change)?,
        drawdown_penalty: value_or(config, s, "drawdown_penalty", d.drawdown_penalty)?,
        sharpe_bonus: value_or(config, s, "sharpe_bonus", d.sharpe_bonus)?,
        sharpe_window: value_or(config, s, "sharpe_window", d.sharpe_window)?,
        shield_penalty: value_or(config, s, "shield_penalty", d.shield_penalty)?,
    })
}

pub fn load_walkforward_config(config: &dyn ConfigPort) -> Result<WalkForwardConfig, WfsimError> {
    let s = "walkforward";
    let start = parse_date(config, s, "start_date")?;
    let end = parse_date(config, s, "end_date")?;
    if start >= end {
        return Err(WfsimError::invalid(
            s,
            "start_date",
            "start_date must be before end_date",
        ));
    }

    let train_window: WindowLength = required(config, s, "train_window")?;
    let eval_window: WindowLength = required(config, s, "eval_window")?;
    let step = value_or(config, s, "step", eval_window)?;
    let mode: SplitMode = value_or(config, s, "mode", SplitMode::default())?;

    let walkforward = WalkForwardConfig {
        range: TimeRange::new(start, end),
        train_window,
        eval_window,
        step,
        mode,
        parallel: config.get_bool(s, "parallel", false),
    };
    // Surfaces window/range problems here rather than at orchestrator build.
    walkforward.splits()?;
    Ok(walkforward)
}

pub fn load_pipeline_contract(config: &dyn ConfigPort) -> Result<PipelineContract, WfsimError> {
    let s = "pipeline";
    let schema_version: String = required(config, s, "schema_version")?;
    let min_fit_rows = value_or(config, s, "min_fit_rows", DEFAULT_MIN_FIT_ROWS)?;
    let raw = config
        .get_string(s, "features")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| WfsimError::ConfigMissing {
            section: s.to_string(),
            key: "features".to_string(),
        })?;

    let features = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| FeatureSpec::parse(part).map_err(|reason| WfsimError::invalid(s, "features", reason)))
        .collect::<Result<Vec<_>, _>>()?;

    let contract = PipelineContract::new(schema_version, min_fit_rows, features);
    contract.validate()?;
    Ok(contract)
}

pub fn load_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, WfsimError> {
    let s = "strategy";
    let d = LinearQParams::default();
    let kind: StrategyKind = value_or(config, s, "kind", StrategyKind::Hold)?;
    let feature = config
        .get_string(s, "feature")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if kind == StrategyKind::Momentum && feature.is_none() {
        return Err(WfsimError::ConfigMissing {
            section: s.to_string(),
            key: "feature".to_string(),
        });
    }

    let learning = LinearQParams {
        episodes: value_or(config, s, "episodes", d.episodes)?,
        learning_rate: value_or(config, s, "learning_rate", d.learning_rate)?,
        discount: value_or(config, s, "discount", d.discount)?,
        epsilon: value_or(config, s, "epsilon", d.epsilon)?,
        seed: value_or(config, s, "seed", d.seed)?,
    };
    learning.validate()?;

    Ok(StrategyConfig {
        kind,
        feature,
        threshold: value_or(config, s, "threshold", 0.0)?,
        learning,
    })
}

fn validate_strategy_against_pipeline(
    strategy: &StrategyConfig,
    pipeline: &PipelineContract,
) -> Result<(), WfsimError> {
    match &strategy.feature {
        Some(feature) if !pipeline.features.iter().any(|f| &f.name == feature) => {
            Err(WfsimError::invalid(
                "strategy",
                "feature",
                format!("feature '{}' is not defined in [pipeline] features", feature),
            ))
        }
        _ => Ok(()),
    }
}

pub fn load_metrics_config(config: &dyn ConfigPort) -> Result<MetricsConfig, WfsimError> {
    let d = MetricsConfig::default();
    let metrics = MetricsConfig {
        risk_free_rate: value_or(config, "metrics", "risk_free_rate", d.risk_free_rate)?,
        periods_per_year: value_or(config, "metrics", "periods_per_year", d.periods_per_year)?,
    };
    metrics.validate()?;
    Ok(metrics)
}

pub fn load_monte_carlo_config(
    config: &dyn ConfigPort,
    starting_equity: f64,
) -> Result<MonteCarloConfig, WfsimError> {
    let s = "montecarlo";
    let d = MonteCarloConfig::default();
    let mc = MonteCarloConfig {
        num_resamples: value_or(config, s, "resamples", d.num_resamples)?,
        block_size: optional(config, s, "block_size")?,
        seed: value_or(config, s, "seed", d.seed)?,
        starting_equity,
        confidence: value_or(config, s, "confidence", d.confidence)?,
    };
    mc.validate()?;
    Ok(mc)
}

fn optional<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, WfsimError>
where
    T: FromStr,
    T::Err: Display,
{
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            WfsimError::invalid(section, key, format!("cannot parse '{}': {}", raw.trim(), e))
        }),
    }
}

fn value_or<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, WfsimError>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(optional(config, section, key)?.unwrap_or(default))
}

fn required<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, WfsimError>
where
    T: FromStr,
    T::Err: Display,
{
    optional(config, section, key)?.ok_or_else(|| WfsimError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn parse_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, WfsimError> {
    match config.get_string(section, key) {
        None => Err(WfsimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            WfsimError::invalid(
                section,
                key,
                format!("invalid {} format, expected YYYY-MM-DD", key),
            )
        }),
    }
}
