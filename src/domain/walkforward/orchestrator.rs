//! Walk-forward orchestration.
//!
//! For each split the orchestrator fits the feature pipeline on the training
//! window (or replays a frozen one), lets a fresh policy learn against a
//! training environment, then evaluates the frozen policy through a new
//! environment over the evaluation window. The frozen policy is also
//! replayed over its own training window so the report can compare in-sample
//! and out-of-sample performance. Splits share nothing mutable, so
//! they may run on the rayon pool; reports always come back in split order.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::backtest::{run_episode, BacktestResult};
use crate::domain::bar::BarFrame;
use crate::domain::env::{EnvConfig, MarketEnv};
use crate::domain::error::{ErrorKind, WfsimError};
use crate::domain::feature::{
    export_state, fit, restore, transform, FeatureFrame, FittedScaler, PipelineArtifact,
    PipelineContract, RestoreMode,
};
use crate::domain::metrics::{Metrics, MetricsConfig};
use crate::domain::policy::{Strategy, StrategyFactory};
use crate::domain::range::{TimeRange, WindowLength};
use crate::ports::artifact_port::{ArtifactKey, ArtifactStore};

use super::cancel::CancellationToken;
use super::monte_carlo::{monte_carlo, MonteCarloConfig};
use super::report::{
    ArtifactRefs, InSampleCheck, RunSummary, SplitReport, SplitStatus, WalkForwardReport,
};
use super::split::{build_splits, SplitMode, WalkForwardSplit};

/// Episodes need a decision bar and a fill bar.
const MIN_EPISODE_ROWS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub range: TimeRange,
    pub train_window: WindowLength,
    pub eval_window: WindowLength,
    pub step: WindowLength,
    pub mode: SplitMode,
    /// Evaluate splits of one symbol on the rayon pool.
    pub parallel: bool,
}

impl WalkForwardConfig {
    pub fn splits(&self) -> Result<Vec<WalkForwardSplit>, WfsimError> {
        build_splits(
            self.range,
            self.train_window,
            self.eval_window,
            self.step,
            self.mode,
        )
    }
}

pub struct Orchestrator {
    env_config: EnvConfig,
    contract: PipelineContract,
    metrics: MetricsConfig,
    splits: Vec<WalkForwardSplit>,
    parallel: bool,
    frozen: Option<Arc<FittedScaler>>,
    store: Option<Arc<dyn ArtifactStore>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Validates every configuration object and generates the splits. Any
    /// configuration problem surfaces here, before a single bar is touched.
    pub fn new(
        config: &WalkForwardConfig,
        env_config: EnvConfig,
        contract: PipelineContract,
        metrics: MetricsConfig,
    ) -> Result<Self, WfsimError> {
        env_config.validate()?;
        contract.validate()?;
        metrics.validate()?;
        let splits = config.splits()?;
        debug!(
            splits = splits.len(),
            mode = %config.mode,
            range = %config.range,
            "built walk-forward splits"
        );
        Ok(Orchestrator {
            env_config,
            contract,
            metrics,
            splits,
            parallel: config.parallel,
            frozen: None,
            store: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replay a previously exported pipeline on every split instead of
    /// fitting one per training window.
    pub fn with_frozen_pipeline(
        mut self,
        artifact: PipelineArtifact,
        mode: RestoreMode,
    ) -> Result<Self, WfsimError> {
        let (contract, scaler) = restore(artifact, &self.contract, mode)?;
        self.contract = contract;
        self.frozen = Some(Arc::new(scaler));
        Ok(self)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn splits(&self) -> &[WalkForwardSplit] {
        &self.splits
    }

    pub fn contract(&self) -> &PipelineContract {
        &self.contract
    }

    pub fn run(
        &self,
        factory: &dyn StrategyFactory,
        bars: &BarFrame,
    ) -> Result<WalkForwardReport, WfsimError> {
        self.run_splits(factory, bars, &self.splits)
    }

    /// Run several symbols against the same splits in parallel. The first
    /// data or schema error aborts the whole batch.
    pub fn run_symbols(
        &self,
        factory: &dyn StrategyFactory,
        frames: &[BarFrame],
    ) -> Result<Vec<WalkForwardReport>, WfsimError> {
        frames
            .par_iter()
            .map(|frame| self.run(factory, frame))
            .collect()
    }

    pub fn run_splits(
        &self,
        factory: &dyn StrategyFactory,
        bars: &BarFrame,
        splits: &[WalkForwardSplit],
    ) -> Result<WalkForwardReport, WfsimError> {
        if bars.is_empty() {
            return Err(WfsimError::EmptyInput {
                reason: format!("no bars for {}", bars.symbol),
            });
        }
        info!(
            symbol = %bars.symbol,
            strategy = factory.name(),
            splits = splits.len(),
            parallel = self.parallel,
            "starting walk-forward run"
        );

        let (reports, partial) = if self.parallel {
            let outcomes: Vec<Option<Result<SplitReport, WfsimError>>> = splits
                .par_iter()
                .map(|split| {
                    if self.cancel.is_cancelled() {
                        None
                    } else {
                        Some(self.run_split(factory, bars, split))
                    }
                })
                .collect();
            let partial = outcomes.iter().any(Option::is_none);
            let reports = outcomes
                .into_iter()
                .flatten()
                .collect::<Result<Vec<_>, _>>()?;
            (reports, partial)
        } else {
            let mut reports = Vec::with_capacity(splits.len());
            let mut partial = false;
            for split in splits {
                if self.cancel.is_cancelled() {
                    partial = true;
                    break;
                }
                reports.push(self.run_split(factory, bars, split)?);
            }
            (reports, partial)
        };

        if partial {
            warn!(
                symbol = %bars.symbol,
                completed = reports.len(),
                total = splits.len(),
                "walk-forward run cancelled"
            );
        }

        let report = WalkForwardReport::new(
            bars.symbol.clone(),
            factory.name(),
            self.contract.schema_version.clone(),
            reports,
            partial,
        );
        info!(
            symbol = %report.symbol,
            ok = report.aggregate.ok,
            skipped = report.aggregate.skipped,
            failed = report.aggregate.failed,
            mean_sharpe = report.aggregate.mean_sharpe,
            "walk-forward run finished"
        );
        Ok(report)
    }

    /// Simulation errors fail only this split; everything else propagates.
    fn run_split(
        &self,
        factory: &dyn StrategyFactory,
        bars: &BarFrame,
        split: &WalkForwardSplit,
    ) -> Result<SplitReport, WfsimError> {
        let required = self.contract.max_lookback().max(MIN_EPISODE_ROWS);
        let eval_bars = bars.count_in(&split.eval);
        if eval_bars < required {
            debug!(
                split = split.index,
                bars = eval_bars,
                required,
                "skipping split with too few evaluation bars"
            );
            return Ok(SplitReport::skipped(*split, eval_bars, required));
        }

        match self.evaluate_split(factory, bars, split) {
            Ok(report) => Ok(report),
            Err(err) if err.kind() == ErrorKind::Simulation => {
                warn!(split = split.index, error = %err, "split failed");
                Ok(SplitReport::failed(*split, err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    fn evaluate_split(
        &self,
        factory: &dyn StrategyFactory,
        bars: &BarFrame,
        split: &WalkForwardSplit,
    ) -> Result<SplitReport, WfsimError> {
        let scaler = match &self.frozen {
            Some(scaler) => Arc::clone(scaler),
            None => Arc::new(fit(bars, &self.contract, split.train)?),
        };

        let mut strategy = factory.build(&self.contract)?;
        let train_frame = Arc::new(self.features(bars, &scaler, &split.train)?);
        let trainable = train_frame.len() >= MIN_EPISODE_ROWS;
        if trainable {
            let mut env = MarketEnv::new(self.env_config.clone())?;
            strategy.train(&mut env, Arc::clone(&train_frame))?;
        } else {
            debug!(
                split = split.index,
                rows = train_frame.len(),
                "training window too short, policy left untrained"
            );
        }

        let eval_frame = self.features(bars, &scaler, &split.eval)?;
        if eval_frame.len() < MIN_EPISODE_ROWS {
            debug!(
                split = split.index,
                rows = eval_frame.len(),
                "skipping split with too few complete evaluation rows"
            );
            return Ok(SplitReport::skipped(
                *split,
                eval_frame.len(),
                MIN_EPISODE_ROWS,
            ));
        }

        let mut env = MarketEnv::new(self.env_config.clone())?;
        let episode = run_episode(&mut env, strategy.as_ref(), Arc::new(eval_frame))?;
        let result = BacktestResult::from_episode(
            factory.name(),
            bars.symbol.clone(),
            split.index,
            split.eval,
            episode,
            &self.metrics,
        );

        let in_sample = if trainable {
            let mut env = MarketEnv::new(self.env_config.clone())?;
            let replay = run_episode(&mut env, strategy.as_ref(), train_frame)?;
            let metrics =
                Metrics::compute(&replay.equity_curve, &replay.trades, &self.metrics).to_map();
            let check = InSampleCheck::new(metrics, &result.metrics);
            if check.overfit {
                warn!(
                    split = split.index,
                    train_sharpe = check.sharpe(),
                    eval_sharpe = result.metric("sharpe_ratio").unwrap_or(0.0),
                    "evaluation sharpe degraded by more than half"
                );
            }
            Some(check)
        } else {
            None
        };

        let key = ArtifactKey::new(
            bars.symbol.clone(),
            factory.name(),
            split.index,
            self.contract.schema_version.clone(),
        );
        let artifacts = self.persist(&key, &scaler, strategy.as_ref())?;

        info!(
            split = split.index,
            eval = %split.eval,
            trades = result.trades.len(),
            total_return = result.metric("total_return").unwrap_or(0.0),
            "split evaluated"
        );
        Ok(SplitReport {
            split: *split,
            status: SplitStatus::Ok,
            result: Some(result),
            in_sample,
            artifacts,
        })
    }

    /// Complete feature rows inside `window`, computed only from bars
    /// strictly before `window.end`.
    fn features(
        &self,
        bars: &BarFrame,
        scaler: &FittedScaler,
        window: &TimeRange,
    ) -> Result<FeatureFrame, WfsimError> {
        Ok(transform(&bars.before(window.end), &self.contract, scaler)?
            .restrict(window)
            .drop_incomplete())
    }

    fn persist(
        &self,
        key: &ArtifactKey,
        scaler: &FittedScaler,
        strategy: &dyn Strategy,
    ) -> Result<Option<ArtifactRefs>, WfsimError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let artifact = export_state(&self.contract, scaler)?;
        let pipeline = store.save_pipeline(key, &artifact)?;
        let weights = match strategy.weights()? {
            Some(blob) => Some(store.save_weights(key, &blob)?),
            None => None,
        };
        debug!(key = %key, pipeline = %pipeline, "persisted split artifacts");
        Ok(Some(ArtifactRefs { pipeline, weights }))
    }
}

/// Attach a Monte Carlo distribution of each symbol's stitched evaluation
/// trades to the reports.
pub fn summarize(
    reports: Vec<WalkForwardReport>,
    config: &MonteCarloConfig,
) -> Result<RunSummary, WfsimError> {
    let mut distributions = BTreeMap::new();
    for report in &reports {
        let trades = report.stitched_trades();
        distributions.insert(report.symbol.clone(), monte_carlo(&trades, config)?);
    }
    Ok(RunSummary {
        reports,
        monte_carlo: distributions,
    })
}
