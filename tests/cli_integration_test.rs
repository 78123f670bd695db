//! CLI integration tests against a database file in a temp directory.
//!
//! Tests cover:
//! - Config loading and environment overrides
//! - Fixture import of bars and the ledger
//! - Indicator, strategy and signal commands
//! - Exit codes for config, input and conflict errors

mod common;

use clap::Parser;
use common::*;
use quantvault::adapters::file_config_adapter::FileConfigAdapter;
use quantvault::adapters::sqlite_adapter::SqliteAdapter;
use quantvault::cli::{self, Cli};
use quantvault::domain::config_validation::{app_settings, database_settings};
use quantvault::domain::strategy::SignalFilter;
use quantvault::ports::holdings_port::HoldingsPort;
use quantvault::ports::indicator_port::IndicatorPort;
use quantvault::ports::signal_port::{SignalPort, StrategyPort};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("desk.db");
        let config = dir.path().join("quantvault.ini");
        fs::write(
            &config,
            format!(
                "[database]\npath = {}\npool_size = 2\n\n[risk]\nrisk_free_rate = 0.03\n",
                db.display()
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> String {
        let mut argv = vec!["quantvault", "--config", self.config.to_str().unwrap()];
        argv.extend_from_slice(args);
        let code = cli::run(Cli::parse_from(argv));
        format!("{code:?}")
    }

    fn store(&self) -> SqliteAdapter {
        let config = FileConfigAdapter::from_file(&self.config).unwrap();
        SqliteAdapter::open(&database_settings(&config).unwrap()).unwrap()
    }
}

fn exit(code: u8) -> String {
    format!("{:?}", ExitCode::from(code))
}

fn success() -> String {
    format!("{:?}", ExitCode::SUCCESS)
}

fn write_price_file(dir: &Path, ticker: &str, closes: &[f64]) {
    let mut csv = String::from("date,open,high,low,close,volume\n");
    for bar in daily_series(date(2024, 1, 1), closes) {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        ));
    }
    fs::write(dir.join(format!("{ticker}.csv")), csv).unwrap();
}

#[test]
fn config_file_feeds_settings() {
    let ws = Workspace::new();
    let config = FileConfigAdapter::from_file(&ws.config).unwrap();
    let settings = app_settings(&config).unwrap();
    assert_eq!(settings.database.pool_size, 2);
    assert!((settings.risk_free_rate - 0.03).abs() < f64::EPSILON);
    assert!(settings.database.path.ends_with("desk.db"));
}

#[test]
fn init_db_creates_schema() {
    let ws = Workspace::new();
    assert_eq!(ws.run(&["init-db"]), success());
    assert!(ws.store().load_materialized().unwrap().is_none());
}

#[test]
fn unreadable_config_is_config_error() {
    let ws = Workspace::new();
    fs::write(&ws.config, "[database\npath = x\n").unwrap();
    assert_eq!(ws.run(&["init-db"]), exit(2));
}

#[test]
fn invalid_pool_size_is_config_error() {
    let ws = Workspace::new();
    fs::write(&ws.config, "[database]\npool_size = 0\n").unwrap();
    assert_eq!(ws.run(&["holdings"]), exit(2));
}

#[test]
fn ledger_import_materializes_holdings() {
    let ws = Workspace::new();
    let securities = ws.path("securities.csv");
    let trades = ws.path("trades.csv");
    fs::write(
        &securities,
        "ticker,name,price,sector,beta\nAAPL,Apple,120,Technology,1.2\n",
    )
    .unwrap();
    fs::write(
        &trades,
        "ticker,side,quantity,price,status\nAAPL,BUY,10,100,\nAAPL,SELL,3,120,\n",
    )
    .unwrap();

    let status = ws.run(&[
        "import-ledger",
        "--securities",
        securities.to_str().unwrap(),
        "--trades",
        trades.to_str().unwrap(),
    ]);
    assert_eq!(status, success());

    let rows = ws.store().load_materialized().unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert!((rows[0].net_quantity - 7.0).abs() < 1e-12);

    assert_eq!(ws.run(&["holdings"]), success());
    assert_eq!(ws.run(&["snapshot", "--date", "2024-06-30"]), success());
    assert_eq!(ws.run(&["risk", "--as-of", "2024-06-30"]), success());
    assert_eq!(
        ws.run(&["risk-check", "--ticker", "AAPL", "--side", "BUY", "--quantity", "5", "--price", "120"]),
        success()
    );
    assert_eq!(
        ws.run(&["risk-check", "--ticker", "AAPL", "--side", "BUY", "--quantity", "0", "--price", "120"]),
        exit(4)
    );
}

#[test]
fn bars_to_signals_through_the_cli() {
    let ws = Workspace::new();
    let prices = ws.path("prices");
    fs::create_dir(&prices).unwrap();
    write_price_file(&prices, "AAPL", &falling_closes(60));

    assert_eq!(ws.run(&["import-bars", "--dir", prices.to_str().unwrap()]), success());
    assert_eq!(
        ws.run(&["compute-indicators", "--ticker", "aapl", "--start", "2024-01-01", "--end", "2024-12-31"]),
        success()
    );
    assert!(ws.store().latest_indicator_value("AAPL", "RSI_14").unwrap().is_some());

    assert_eq!(
        ws.run(&["indicators", "--ticker", "AAPL", "--types", "RSI_14,SMA_20", "--start", "2024-01-01", "--end", "2024-12-31"]),
        success()
    );
    assert_eq!(
        ws.run(&["history", "--ticker", "AAPL", "--start", "2024-01-01", "--end", "2024-01-31"]),
        success()
    );

    assert_eq!(
        ws.run(&["strategy", "add", "--name", "RSI Reversion", "--parameters", r#"{"oversold": 25}"#]),
        success()
    );
    assert_eq!(ws.run(&["strategy", "add", "--name", "RSI Reversion"]), exit(5));

    assert_eq!(ws.run(&["evaluate", "--ticker", "AAPL", "--store"]), success());
    assert_eq!(ws.run(&["evaluate", "--ticker", "AAPL", "--store"]), success());

    let store = ws.store();
    let signals = store.list_signals(&SignalFilter::default()).unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].ticker, "AAPL");

    let id = store.list_strategies().unwrap()[0].id.to_string();
    assert_eq!(ws.run(&["strategy", "deactivate", &id]), success());
    assert!(store.active_strategies().unwrap().is_empty());
    assert_eq!(ws.run(&["strategy", "remove", &id]), success());
    assert_eq!(ws.run(&["strategy", "remove", &id]), exit(4));
    assert_eq!(ws.run(&["signals", "--ticker", "AAPL"]), success());
}

#[test]
fn bad_date_range_is_input_error() {
    let ws = Workspace::new();
    assert_eq!(
        ws.run(&["history", "--ticker", "AAPL", "--start", "2024-02-01", "--end", "2024-01-01"]),
        exit(4)
    );
    assert_eq!(
        ws.run(&["var", "--confidence", "1.5", "--as-of", "2024-01-01"]),
        exit(4)
    );
}

#[test]
fn missing_price_file_is_io_error() {
    let ws = Workspace::new();
    let prices = ws.path("prices");
    fs::create_dir(&prices).unwrap();
    assert_eq!(
        ws.run(&["import-bars", "--dir", prices.to_str().unwrap(), "--ticker", "NOPE"]),
        exit(1)
    );
}
