//! CLI integration tests against real INI and CSV files on disk.
//!
//! Tests cover:
//! - Config loading through the file adapter
//! - `run` end to end, writing a JSON report and per-split artifacts
//! - `splits`, `validate` and `inspect-artifact`
//! - Exit codes for config, data and io failures

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;
use wfsim::cli::{self, Cli};
use wfsim::domain::error::ErrorKind;
use wfsim::domain::walkforward::SplitMode;

const VALID_INI: &str = r#"
[environment]
starting_cash = 25000
commission_bps = 5
slippage_bps = 5

[walkforward]
start_date = 2019-07-01
end_date = 2021-01-01
train_window = 6m
eval_window = 6m
mode = rolling

[pipeline]
schema_version = v1
min_fit_rows = 10
features = ret_1:close:pct_change:1:zscore, vol_10:close:volatility:10:robust

[strategy]
kind = momentum
feature = ret_1

[montecarlo]
resamples = 100
seed = 11
"#;

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("wfsim.ini");
    fs::write(&path, content).unwrap();
    path
}

fn write_csv(dir: &Path, symbol: &str, phase: f64) {
    let start = chrono::NaiveDate::from_ymd_opt(2019, 7, 1).unwrap();
    let mut csv = String::from("date,open,high,low,close,volume\n");
    let mut prev: f64 = 100.0;
    for i in 0..550 {
        let t = i as f64;
        let close = 100.0 + (t * 0.23 + phase).sin() * 5.0 + t * 0.01;
        let date = start + chrono::Duration::days(i);
        csv.push_str(&format!(
            "{},{:.4},{:.4},{:.4},{:.4},{}\n",
            date,
            prev,
            prev.max(close) + 0.5,
            prev.min(close) - 0.5,
            close,
            10_000 + i
        ));
        prev = close;
    }
    fs::write(dir.join(format!("{}.csv", symbol)), csv).unwrap();
}

fn run(args: &[&str]) -> ExitCode {
    let mut argv = vec!["wfsim"];
    argv.extend_from_slice(args);
    cli::run(Cli::try_parse_from(argv).unwrap())
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

mod config_loading {
    use super::*;

    #[test]
    fn load_config_reads_every_section() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), VALID_INI);
        let sim = cli::load_config(&path).unwrap();
        assert_eq!(sim.env.starting_cash, 25_000.0);
        assert_eq!(sim.walkforward.mode, SplitMode::Rolling);
        assert_eq!(sim.walkforward.splits().unwrap().len(), 2);
        assert_eq!(sim.pipeline.features.len(), 2);
        assert_eq!(sim.monte_carlo.num_resamples, 100);
        assert_eq!(sim.monte_carlo.starting_equity, 25_000.0);
    }

    #[test]
    fn missing_strategy_feature_is_config_error() {
        let dir = TempDir::new().unwrap();
        let broken = VALID_INI.replace("feature = ret_1", "feature = ret_99");
        let path = write_config(dir.path(), &broken);
        let err = cli::load_config(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}

mod commands {
    use super::*;

    #[test]
    fn run_writes_json_report_and_artifacts() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        write_csv(&data, "SPY", 0.0);
        write_csv(&data, "QQQ", 1.3);
        let config = write_config(dir.path(), VALID_INI);
        let output = dir.path().join("out").join("report.json");
        let artifacts = dir.path().join("artifacts");

        let code = run(&[
            "run",
            "--config",
            s(&config),
            "--data-dir",
            s(&data),
            "--output",
            s(&output),
            "--artifacts",
            s(&artifacts),
        ]);
        assert_eq!(code, ExitCode::SUCCESS);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        let reports = json["reports"].as_array().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0]["symbol"], "QQQ");
        assert_eq!(reports[1]["symbol"], "SPY");
        for report in reports {
            assert_eq!(report["strategy"], "momentum");
            assert_eq!(report["splits"].as_array().unwrap().len(), 2);
            assert_eq!(report["partial"], false);
        }
        assert!(json["monte_carlo"]["SPY"].is_object());

        let written = fs::read_dir(&artifacts).unwrap().count();
        assert_eq!(written, 4);
    }

    #[test]
    fn run_with_frozen_pipeline_replays_it() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        write_csv(&data, "SPY", 0.0);
        let config = write_config(dir.path(), VALID_INI);
        let artifacts = dir.path().join("artifacts");

        let first = run(&[
            "run",
            "--config",
            s(&config),
            "--data-dir",
            s(&data),
            "--symbol",
            "spy",
            "--artifacts",
            s(&artifacts),
        ]);
        assert_eq!(first, ExitCode::SUCCESS);

        let pipeline = artifacts.join("SPY_momentum_v1_split000.pipeline.json");
        assert!(pipeline.exists());
        let output = dir.path().join("frozen.json");
        let second = run(&[
            "run",
            "--config",
            s(&config),
            "--data-dir",
            s(&data),
            "--symbol",
            "SPY",
            "--pipeline",
            s(&pipeline),
            "--output",
            s(&output),
        ]);
        assert_eq!(second, ExitCode::SUCCESS);
        assert!(output.exists());
    }

    #[test]
    fn frozen_pipeline_with_other_schema_exits_with_schema_code() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        write_csv(&data, "SPY", 0.0);
        let config = write_config(dir.path(), VALID_INI);
        let artifacts = dir.path().join("artifacts");
        run(&[
            "run",
            "--config",
            s(&config),
            "--data-dir",
            s(&data),
            "--artifacts",
            s(&artifacts),
        ]);
        let pipeline = artifacts.join("SPY_momentum_v1_split000.pipeline.json");

        let v2 = write_config(
            dir.path(),
            &VALID_INI.replace("schema_version = v1", "schema_version = v2"),
        );
        let strict = run(&[
            "run",
            "--config",
            s(&v2),
            "--data-dir",
            s(&data),
            "--pipeline",
            s(&pipeline),
        ]);
        assert_eq!(strict, ExitCode::from(3));

        let lenient = run(&[
            "run",
            "--config",
            s(&v2),
            "--data-dir",
            s(&data),
            "--pipeline",
            s(&pipeline),
            "--best-effort",
        ]);
        assert_eq!(lenient, ExitCode::SUCCESS);
    }

    #[test]
    fn inspect_artifact_checks_schema() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        write_csv(&data, "SPY", 0.0);
        let config = write_config(dir.path(), VALID_INI);
        let artifacts = dir.path().join("artifacts");
        run(&[
            "run",
            "--config",
            s(&config),
            "--data-dir",
            s(&data),
            "--artifacts",
            s(&artifacts),
        ]);
        let pipeline = artifacts.join("SPY_momentum_v1_split001.pipeline.json");

        assert_eq!(
            run(&["inspect-artifact", "--path", s(&pipeline)]),
            ExitCode::SUCCESS
        );
        assert_eq!(
            run(&[
                "inspect-artifact",
                "--path",
                s(&pipeline),
                "--schema-version",
                "v9"
            ]),
            ExitCode::from(3)
        );
        assert_eq!(
            run(&[
                "inspect-artifact",
                "--path",
                s(&pipeline),
                "--schema-version",
                "v9",
                "--best-effort"
            ]),
            ExitCode::SUCCESS
        );
    }

    #[test]
    fn splits_and_validate_succeed_on_valid_config() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), VALID_INI);
        assert_eq!(run(&["splits", "--config", s(&config)]), ExitCode::SUCCESS);
        assert_eq!(run(&["validate", "--config", s(&config)]), ExitCode::SUCCESS);
    }
}

mod exit_codes {
    use super::*;

    #[test]
    fn invalid_config_exits_with_config_code() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            dir.path(),
            &VALID_INI.replace("train_window = 6m", "train_window = 6y"),
        );
        assert_eq!(run(&["validate", "--config", s(&config)]), ExitCode::from(2));
    }

    #[test]
    fn missing_config_file_exits_with_config_code() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.ini");
        assert_eq!(run(&["splits", "--config", s(&missing)]), ExitCode::from(2));
    }

    #[test]
    fn missing_data_directory_exits_with_io_code() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), VALID_INI);
        let data = dir.path().join("absent");
        assert_eq!(
            run(&["run", "--config", s(&config), "--data-dir", s(&data)]),
            ExitCode::from(1)
        );
    }

    #[test]
    fn unsorted_csv_exits_with_data_code() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), VALID_INI);
        fs::write(
            dir.path().join("SPY.csv"),
            "date,open,high,low,close,volume\n\
             2020-01-02,1,1,1,1,1\n\
             2020-01-01,1,1,1,1,1\n",
        )
        .unwrap();
        assert_eq!(
            run(&[
                "run",
                "--config",
                s(&config),
                "--data-dir",
                s(dir.path()),
                "--symbol",
                "SPY"
            ]),
            ExitCode::from(5)
        );
    }
}
