//! CLI definition and dispatch.

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::alphavantage_adapter::AlphaVantageAdapter;
use crate::adapters::csv_adapter::{self, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::backfill::BackfillService;
use crate::domain::config_validation::{app_settings, market_data_settings, AppSettings};
use crate::domain::error::QuantvaultError;
use crate::domain::holdings::{current_holdings, recompute_holdings, totals, HoldingsTotals};
use crate::domain::indicator::IndicatorType;
use crate::domain::indicator_cache::{
    DateRange, IndicatorCache, COMPUTE_LOOKBACK_DAYS, READ_LOOKBACK_DAYS,
};
use crate::domain::ohlcv::{normalize_ticker, Interval};
use crate::domain::portfolio::take_snapshot;
use crate::domain::position::{Position, TradeSide};
use crate::domain::price_refresh::{PriceRefresher, RefreshCoordinator};
use crate::domain::rate_limit::MinIntervalLimiter;
use crate::domain::risk::{ProposedTrade, RiskEngine};
use crate::domain::strategy::{NewStrategy, SignalFilter};
use crate::domain::strategy_eval::StrategyEngine;
use crate::ports::data_port::PriceBarPort;

#[derive(Parser, Debug)]
#[command(name = "quantvault", about = "Trading desk analytics: indicators, holdings, risk and signals")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    InitDb,
    /// Load daily bars from <TICKER>.csv files in a directory
    ImportBars {
        #[arg(long)]
        dir: PathBuf,
        /// Only these tickers (default: every file in the directory)
        #[arg(long)]
        ticker: Vec<String>,
    },
    /// Load securities and trades from CSV, then rematerialize holdings
    ImportLedger {
        #[arg(long)]
        securities: Option<PathBuf>,
        #[arg(long)]
        trades: Option<PathBuf>,
    },
    /// Fetch full daily history from the provider
    Backfill {
        /// Single ticker (default: every security)
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Compute and cache the indicator set for a ticker
    ComputeIndicators {
        #[arg(long)]
        ticker: String,
        #[arg(long, default_value = "daily")]
        interval: Interval,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Read cached indicator values
    Indicators {
        #[arg(long)]
        ticker: String,
        /// Indicator keys such as RSI_14,SMA_20 (default: the cached set)
        #[arg(long, value_delimiter = ',')]
        types: Vec<IndicatorType>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Compute first when nothing is cached
        #[arg(long)]
        compute: bool,
    },
    /// Show stored price bars
    History {
        #[arg(long)]
        ticker: String,
        #[arg(long, default_value = "daily")]
        interval: Interval,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Evaluate active strategies for a ticker
    Evaluate {
        #[arg(long)]
        ticker: String,
        /// Persist the resulting signals
        #[arg(long)]
        store: bool,
    },
    /// Manage strategies
    Strategy {
        #[command(subcommand)]
        command: StrategyCommand,
    },
    /// List stored signals, newest first
    Signals {
        #[arg(long)]
        ticker: Option<String>,
        #[arg(long)]
        strategy_id: Option<i64>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Recompute and materialize holdings from the ledger
    RecomputeHoldings,
    /// Show current holdings and totals
    Holdings,
    /// Record the portfolio snapshot for a day
    Snapshot {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Portfolio risk metrics
    Risk {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Historical value at risk for one ticker or the whole bar store
    Var {
        #[arg(long)]
        ticker: Option<String>,
        #[arg(long, default_value_t = 0.95)]
        confidence: f64,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Pre-trade risk warnings for a proposed trade
    RiskCheck {
        #[arg(long)]
        ticker: String,
        #[arg(long)]
        side: TradeSide,
        #[arg(long)]
        quantity: f64,
        #[arg(long)]
        price: f64,
    },
    /// Refresh quotes and everything derived from prices
    Refresh,
}

#[derive(Subcommand, Debug)]
pub enum StrategyCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// JSON object, e.g. '{"oversold": 25}'
        #[arg(long)]
        parameters: Option<String>,
        #[arg(long)]
        inactive: bool,
    },
    List,
    Activate { id: i64 },
    Deactivate { id: i64 },
    Remove { id: i64 },
}

struct Context {
    config: FileConfigAdapter,
    settings: AppSettings,
    store: SqliteAdapter,
}

#[derive(Serialize)]
struct HoldingsView {
    positions: Vec<Position>,
    #[serde(flatten)]
    totals: HoldingsTotals,
}

#[derive(Serialize)]
struct LedgerImport {
    securities: usize,
    trades: usize,
    holdings: usize,
}

#[derive(Serialize)]
struct BarImport {
    ticker: String,
    bars: usize,
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: Option<&PathBuf>) -> Result<FileConfigAdapter, QuantvaultError> {
    let config = match path {
        Some(p) => FileConfigAdapter::from_file(p)?,
        None => FileConfigAdapter::empty(),
    };
    Ok(config.apply_env_overrides())
}

fn open_context(path: Option<&PathBuf>) -> Result<Context, QuantvaultError> {
    let config = load_config(path)?;
    let settings = app_settings(&config)?;
    let store = SqliteAdapter::open(&settings.database)?;
    store.initialize_schema()?;
    Ok(Context {
        config,
        settings,
        store,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), QuantvaultError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn execute(cli: Cli) -> Result<(), QuantvaultError> {
    let ctx = open_context(cli.config.as_ref())?;
    let store = &ctx.store;

    match cli.command {
        Command::InitDb => {
            eprintln!("Database ready at {}", ctx.settings.database.path);
            Ok(())
        }
        Command::ImportBars { dir, ticker } => {
            let csv = CsvAdapter::new(dir);
            let tickers = if ticker.is_empty() {
                csv.list_symbols()?
            } else {
                ticker.iter().map(|t| normalize_ticker(t)).collect()
            };
            let mut imported = Vec::with_capacity(tickers.len());
            for t in tickers {
                let bars = csv.read_bars(&t)?;
                let n = store.import_bars(&bars)?;
                imported.push(BarImport { ticker: t, bars: n });
            }
            print_json(&imported)
        }
        Command::ImportLedger { securities, trades } => {
            let mut summary = LedgerImport {
                securities: 0,
                trades: 0,
                holdings: 0,
            };
            if let Some(path) = securities {
                for security in csv_adapter::read_securities(&path)? {
                    store.upsert_security(&security)?;
                    summary.securities += 1;
                }
            }
            if let Some(path) = trades {
                for row in csv_adapter::read_trades(&path)? {
                    store.insert_trade(&row.ticker, row.side, row.quantity, row.price, row.status)?;
                    summary.trades += 1;
                }
            }
            summary.holdings =
                recompute_holdings(store, store, store, Utc::now().naive_utc())?.len();
            print_json(&summary)
        }
        Command::Backfill { ticker } => {
            let market = market_data_settings(&ctx.config)?;
            let provider = AlphaVantageAdapter::new(&market)?;
            let limiter = MinIntervalLimiter::new(market.min_call_interval);
            let service = BackfillService {
                provider: &provider,
                bars: store,
                securities: store,
                limiter: &limiter,
            };
            match ticker {
                Some(t) => print_json(&service.backfill_ticker(&t)?),
                None => print_json(&service.backfill_all()?),
            }
        }
        Command::ComputeIndicators {
            ticker,
            interval,
            start,
            end,
        } => {
            let range = DateRange::resolve(start, end, COMPUTE_LOOKBACK_DAYS, today())?;
            let cache = IndicatorCache {
                bars: store,
                store,
            };
            print_json(&cache.compute_and_store(&ticker, interval, range)?)
        }
        Command::Indicators {
            ticker,
            types,
            start,
            end,
            compute,
        } => {
            let types = if types.is_empty() {
                IndicatorType::cached_set()
            } else {
                types
            };
            let range = DateRange::resolve(start, end, READ_LOOKBACK_DAYS, today())?;
            let cache = IndicatorCache {
                bars: store,
                store,
            };
            let values = if compute {
                let compute_range = DateRange::trailing(COMPUTE_LOOKBACK_DAYS, range.end);
                cache.get_or_compute(&ticker, &types, range, compute_range)?
            } else {
                cache.get_indicator_values(&ticker, &types, range)?
            };
            print_json(&values)
        }
        Command::History {
            ticker,
            interval,
            start,
            end,
        } => {
            let range = DateRange::resolve(start, end, READ_LOOKBACK_DAYS, today())?;
            let bars =
                store.fetch_bars(&normalize_ticker(&ticker), interval, range.start, range.end)?;
            print_json(&bars)
        }
        Command::Evaluate { ticker, store: persist } => {
            let engine = StrategyEngine {
                strategies: store,
                signals: store,
                indicators: store,
            };
            if persist {
                let inserted = engine.generate_and_store_signals(&ticker, Utc::now().naive_utc())?;
                print_json(&serde_json::json!({ "ticker": normalize_ticker(&ticker), "inserted": inserted }))
            } else {
                print_json(&engine.evaluate_active_strategies(&ticker)?)
            }
        }
        Command::Strategy { command } => {
            let engine = StrategyEngine {
                strategies: store,
                signals: store,
                indicators: store,
            };
            run_strategy_command(&engine, command)
        }
        Command::Signals {
            ticker,
            strategy_id,
            limit,
        } => {
            let engine = StrategyEngine {
                strategies: store,
                signals: store,
                indicators: store,
            };
            print_json(&engine.list_signals(&SignalFilter {
                ticker,
                strategy_id,
                limit,
            })?)
        }
        Command::RecomputeHoldings => {
            print_json(&recompute_holdings(store, store, store, Utc::now().naive_utc())?)
        }
        Command::Holdings => {
            let positions = current_holdings(store, store, store)?;
            let totals = totals(&positions);
            print_json(&HoldingsView { positions, totals })
        }
        Command::Snapshot { date } => {
            let date = date.unwrap_or_else(today);
            print_json(&take_snapshot(store, store, store, store, date)?)
        }
        Command::Risk { as_of } => {
            let engine = risk_engine(&ctx);
            print_json(&engine.compute_risk_metrics(as_of.unwrap_or_else(today))?)
        }
        Command::Var {
            ticker,
            confidence,
            as_of,
        } => {
            let engine = risk_engine(&ctx);
            let var = engine.compute_var(ticker.as_deref(), confidence, as_of.unwrap_or_else(today))?;
            print_json(&serde_json::json!({
                "ticker": ticker.as_deref().map(normalize_ticker),
                "confidence": confidence,
                "var": var,
            }))
        }
        Command::RiskCheck {
            ticker,
            side,
            quantity,
            price,
        } => {
            if !(quantity > 0.0) || !(price > 0.0) {
                return Err(QuantvaultError::invalid_input(
                    "quantity and price must be positive",
                ));
            }
            let engine = risk_engine(&ctx);
            print_json(&engine.check_trade_risk(&ProposedTrade {
                ticker: normalize_ticker(&ticker),
                side,
                quantity,
                price,
            })?)
        }
        Command::Refresh => run_refresh(&ctx),
    }
}

fn risk_engine(ctx: &Context) -> RiskEngine<'_> {
    RiskEngine {
        bars: &ctx.store,
        ledger: &ctx.store,
        securities: &ctx.store,
        holdings: &ctx.store,
        snapshots: &ctx.store,
        risk_free_rate: ctx.settings.risk_free_rate,
    }
}

fn run_strategy_command(
    engine: &StrategyEngine<'_>,
    command: StrategyCommand,
) -> Result<(), QuantvaultError> {
    match command {
        StrategyCommand::Add {
            name,
            description,
            parameters,
            inactive,
        } => {
            let parameters = parameters
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?;
            print_json(&engine.create_strategy(NewStrategy {
                name,
                description,
                parameters,
                is_active: !inactive,
            })?)
        }
        StrategyCommand::List => print_json(&engine.list_strategies()?),
        StrategyCommand::Activate { id } => print_json(&engine.set_active(id, true)?),
        StrategyCommand::Deactivate { id } => print_json(&engine.set_active(id, false)?),
        StrategyCommand::Remove { id } => {
            engine.delete_strategy(id)?;
            eprintln!("Removed strategy {id}");
            Ok(())
        }
    }
}

/// Runs the batch on the coordinator's background thread and waits for it, so
/// the printed status is final.
fn run_refresh(ctx: &Context) -> Result<(), QuantvaultError> {
    let market = market_data_settings(&ctx.config)?;
    let provider = AlphaVantageAdapter::new(&market)?;
    let limiter = MinIntervalLimiter::new(market.min_call_interval);
    let store = ctx.store.clone();

    let coordinator = RefreshCoordinator::new();
    let handle = coordinator.spawn(move || {
        let refresher = PriceRefresher {
            provider: &provider,
            limiter: &limiter,
            bars: &store,
            securities: &store,
            ledger: &store,
            holdings: &store,
            snapshots: &store,
            indicators: &store,
            strategies: &store,
            signals: &store,
        };
        refresher.refresh_all_prices(Utc::now().naive_utc())
    })?;
    if handle.join().is_err() {
        tracing::error!("price refresh thread panicked");
    }

    let status = coordinator.status();
    print_json(&status)?;
    match status.last_error {
        Some(reason) => Err(QuantvaultError::Database { reason }),
        None => Ok(()),
    }
}
