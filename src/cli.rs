//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_artifact_store::FileArtifactStore;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::bar::BarFrame;
use crate::domain::config_validation::{load_simulation_config, SimulationConfig};
use crate::domain::error::WfsimError;
use crate::domain::feature::{restore, PipelineArtifact, RestoreMode};
use crate::domain::policy::StrategyFactory;
use crate::domain::walkforward::{summarize, Orchestrator, RunSummary, SplitStatus};
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_LOG_FILTER: &str = "info,wfsim=debug";

#[derive(Parser, Debug)]
#[command(name = "wfsim", about = "Walk-forward market simulation and strategy evaluation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a walk-forward evaluation
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory holding one `{SYMBOL}.csv` per symbol
        #[arg(short, long)]
        data_dir: PathBuf,
        /// Comma-separated symbols; defaults to every CSV in the data directory
        #[arg(short, long)]
        symbol: Option<String>,
        /// Write the full JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Persist per-split pipeline artifacts and policy weights here
        #[arg(long)]
        artifacts: Option<PathBuf>,
        /// Replay this exported pipeline instead of fitting one per split
        #[arg(long)]
        pipeline: Option<PathBuf>,
        /// Accept a frozen pipeline whose version or features differ
        #[arg(long)]
        best_effort: bool,
    },
    /// Print the splits a configuration generates
    Splits {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate every configuration section
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the contents of a pipeline artifact
    InspectArtifact {
        #[arg(short, long)]
        path: PathBuf,
        /// Check the artifact against this schema version
        #[arg(long)]
        schema_version: Option<String>,
        #[arg(long)]
        best_effort: bool,
    },
}

/// Install the stderr subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Run {
            config,
            data_dir,
            symbol,
            output,
            artifacts,
            pipeline,
            best_effort,
        } => run_walkforward(&RunArgs {
            config,
            data_dir,
            symbols: symbol,
            output,
            artifacts,
            pipeline,
            best_effort,
        }),
        Command::Splits { config } => run_splits(&config),
        Command::Validate { config } => run_validate(&config),
        Command::InspectArtifact {
            path,
            schema_version,
            best_effort,
        } => run_inspect_artifact(&path, schema_version.as_deref(), best_effort),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub struct RunArgs {
    pub config: PathBuf,
    pub data_dir: PathBuf,
    pub symbols: Option<String>,
    pub output: Option<PathBuf>,
    pub artifacts: Option<PathBuf>,
    pub pipeline: Option<PathBuf>,
    pub best_effort: bool,
}

pub fn load_config(path: &Path) -> Result<SimulationConfig, WfsimError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    load_simulation_config(&adapter)
}

pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn run_walkforward(args: &RunArgs) -> Result<(), WfsimError> {
    // Stage 1: configuration
    info!(config = %args.config.display(), "loading config");
    let sim = load_config(&args.config)?;

    // Stage 2: orchestrator
    let mut orchestrator = Orchestrator::new(
        &sim.walkforward,
        sim.env.clone(),
        sim.pipeline.clone(),
        sim.metrics.clone(),
    )?;
    if let Some(path) = &args.pipeline {
        let artifact = PipelineArtifact::from_json(&fs::read_to_string(path)?)?;
        let mode = if args.best_effort {
            RestoreMode::BestEffort
        } else {
            RestoreMode::Strict
        };
        orchestrator = orchestrator.with_frozen_pipeline(artifact, mode)?;
    }
    if let Some(dir) = &args.artifacts {
        orchestrator = orchestrator.with_artifact_store(Arc::new(FileArtifactStore::new(dir)?));
    }

    // Stage 3: data
    let data = CsvAdapter::new(args.data_dir.clone());
    let symbols = match &args.symbols {
        Some(raw) => parse_symbols(raw),
        None => data.list_symbols()?,
    };
    if symbols.is_empty() {
        return Err(WfsimError::EmptyInput {
            reason: format!("no symbols found in {}", args.data_dir.display()),
        });
    }
    let frames = symbols
        .iter()
        .map(|s| data.fetch_bars(s, None))
        .collect::<Result<Vec<BarFrame>, _>>()?;

    // Stage 4: walk-forward + Monte Carlo
    let reports = orchestrator.run_symbols(&sim.strategy, &frames)?;
    let summary = summarize(reports, &sim.monte_carlo)?;

    // Stage 5: output
    print_summary(&summary, sim.strategy.name());
    if let Some(path) = &args.output {
        JsonReportAdapter::new().write(&summary, &path.display().to_string())?;
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, strategy: &str) {
    println!("strategy: {}", strategy);
    for report in &summary.reports {
        println!();
        println!(
            "{}  ok={} skipped={} failed={}{}",
            report.symbol,
            report.aggregate.ok,
            report.aggregate.skipped,
            report.aggregate.failed,
            if report.partial { "  (partial)" } else { "" }
        );
        println!(
            "  {:>5}  {:<25}  {:<26}  {:>8}  {:>8}  {:>6}",
            "split", "train", "eval", "return", "sharpe", "trades"
        );
        for split in &report.splits {
            match (&split.status, &split.result) {
                (SplitStatus::Ok, Some(result)) => println!(
                    "  {:>5}  {:<25}  {:<26}  {:>7.2}%  {:>8.2}  {:>6}",
                    split.split.index,
                    split.split.train.to_string(),
                    split.split.eval.to_string(),
                    result.metric("total_return").unwrap_or(0.0) * 100.0,
                    result.metric("sharpe_ratio").unwrap_or(0.0),
                    result.trades.len()
                ),
                (status, _) => println!(
                    "  {:>5}  {:<25}  {:<26}  {}",
                    split.split.index,
                    split.split.train.to_string(),
                    split.split.eval.to_string(),
                    status.label()
                ),
            }
        }
        println!(
            "  mean sharpe {:.2}, median sharpe {:.2}, mean return {:.2}%, trades {}",
            report.aggregate.mean_sharpe,
            report.aggregate.median_sharpe,
            report.aggregate.mean_total_return * 100.0,
            report.aggregate.total_trades
        );
        println!(
            "  in-sample sharpe {:.2}, degradation {:.1}%, overfit splits {}",
            report.aggregate.mean_train_sharpe,
            report.aggregate.sharpe_degradation * 100.0,
            report.aggregate.overfit_splits
        );
        if let Some(mc) = summary.monte_carlo.get(&report.symbol) {
            if mc.resamples > 0 {
                println!(
                    "  monte carlo ({} resamples, {:.0}%): return [{:.2}%, {:.2}%], max dd [{:.2}%, {:.2}%], P(loss) {:.1}%, P(ruin) {:.1}%",
                    mc.resamples,
                    mc.confidence * 100.0,
                    mc.total_return.lower * 100.0,
                    mc.total_return.upper * 100.0,
                    mc.max_drawdown.lower * 100.0,
                    mc.max_drawdown.upper * 100.0,
                    mc.prob_loss * 100.0,
                    mc.prob_ruin * 100.0
                );
            } else {
                println!("  monte carlo: too few trades ({})", mc.trades);
            }
        }
    }
}

fn run_splits(config: &Path) -> Result<(), WfsimError> {
    let sim = load_config(config)?;
    let splits = sim.walkforward.splits()?;
    println!(
        "{} splits ({} mode, train {}, eval {}, step {})",
        splits.len(),
        sim.walkforward.mode,
        sim.walkforward.train_window,
        sim.walkforward.eval_window,
        sim.walkforward.step
    );
    for split in &splits {
        println!("  {:>3}  train {}  eval {}", split.index, split.train, split.eval);
    }
    Ok(())
}

fn run_validate(config: &Path) -> Result<(), WfsimError> {
    let sim = load_config(config)?;
    let splits = sim.walkforward.splits()?;
    println!("Configuration is valid.");
    println!("  strategy:  {}", sim.strategy.name());
    println!(
        "  pipeline:  schema {} with {} features (max lookback {})",
        sim.pipeline.schema_version,
        sim.pipeline.features.len(),
        sim.pipeline.max_lookback()
    );
    println!(
        "  range:     {} ({} splits)",
        sim.walkforward.range,
        splits.len()
    );
    println!(
        "  costs:     commission {} bps, slippage {} bps",
        sim.env.commission_bps, sim.env.slippage_bps
    );
    Ok(())
}

fn run_inspect_artifact(
    path: &Path,
    schema_version: Option<&str>,
    best_effort: bool,
) -> Result<(), WfsimError> {
    let artifact = PipelineArtifact::from_json(&fs::read_to_string(path)?)?;
    let mut expected = artifact.contract.clone();
    if let Some(version) = schema_version {
        expected.schema_version = version.to_string();
    }
    let mode = if best_effort {
        RestoreMode::BestEffort
    } else {
        RestoreMode::Strict
    };

    println!("artifact version:  {}", artifact.artifact_version);
    println!("schema version:    {}", artifact.schema_version);
    println!("feature signature: {}", artifact.feature_signature);
    let (contract, scaler) = restore(artifact, &expected, mode)?;
    println!("min fit rows:      {}", contract.min_fit_rows);
    println!("features:");
    for spec in &contract.features {
        match scaler.get(&spec.name) {
            Some(stats) => println!("  {}  {:?}", spec, stats),
            None => println!("  {}", spec),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_symbols_normalizes() {
        assert_eq!(parse_symbols(" spy, qqq ,,iwm"), vec!["SPY", "QQQ", "IWM"]);
        assert!(parse_symbols(" , ").is_empty());
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::try_parse_from([
            "wfsim",
            "run",
            "--config",
            "c.ini",
            "--data-dir",
            "data",
            "--symbol",
            "SPY,QQQ",
            "--best-effort",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                symbol,
                best_effort,
                output,
                ..
            } => {
                assert_eq!(symbol.as_deref(), Some("SPY,QQQ"));
                assert!(best_effort);
                assert!(output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn cli_parses_inspect_artifact() {
        let cli = Cli::try_parse_from([
            "wfsim",
            "inspect-artifact",
            "--path",
            "a.json",
            "--schema-version",
            "v2",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::InspectArtifact { ref schema_version, .. } if schema_version.as_deref() == Some("v2")
        ));
    }
}
