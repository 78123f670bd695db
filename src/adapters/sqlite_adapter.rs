//! SQLite store adapter.
//!
//! One pooled database backs every store port. Natural-key uniqueness for bars,
//! indicator values and signals is enforced by the schema, and writes use
//! `ON CONFLICT` clauses rather than read-then-write.

use crate::domain::config_validation::DatabaseSettings;
use crate::domain::error::QuantvaultError;
use crate::domain::holdings::MaterializedHolding;
use crate::domain::indicator_cache::IndicatorRecord;
use crate::domain::ohlcv::{Interval, PriceBar};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::position::{Security, Trade, TradeSide, TradeStatus};
use crate::domain::strategy::{NewStrategy, Signal, SignalFilter, Strategy, StrategyUpdate};
use crate::ports::data_port::PriceBarPort;
use crate::ports::holdings_port::{HoldingsPort, SnapshotPort};
use crate::ports::indicator_port::IndicatorPort;
use crate::ports::ledger_port::{SecurityPort, TradeLedgerPort};
use crate::ports::signal_port::{SignalPort, StrategyPort};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS price_bars (
    ticker TEXT NOT NULL,
    interval TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL,
    PRIMARY KEY (ticker, interval, timestamp)
);
CREATE INDEX IF NOT EXISTS idx_price_bars_interval_ts ON price_bars(interval, timestamp);

CREATE TABLE IF NOT EXISTS indicator_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    indicator_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    value REAL,
    parameters_json TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_indicator_ticker_type_ts
    ON indicator_values(ticker, indicator_type, timestamp);

CREATE TABLE IF NOT EXISTS securities (
    ticker TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    price REAL NOT NULL DEFAULT 0,
    sector TEXT,
    beta REAL,
    overview_updated_at TEXT
);

CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    side TEXT NOT NULL CHECK (side IN ('BUY', 'SELL')),
    quantity REAL NOT NULL,
    price REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE'
);
CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);

CREATE TABLE IF NOT EXISTS materialized_holdings (
    ticker TEXT PRIMARY KEY,
    net_quantity REAL NOT NULL,
    average_cost REAL NOT NULL,
    market_value REAL NOT NULL,
    cost_basis REAL NOT NULL,
    unrealized_pnl REAL NOT NULL,
    unrealized_pnl_pct REAL,
    last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS holdings_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS portfolio_snapshots (
    snapshot_date TEXT PRIMARY KEY,
    total_market_value REAL NOT NULL,
    total_cost_basis REAL NOT NULL,
    total_pnl REAL NOT NULL,
    total_pnl_pct REAL,
    breakdown_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS strategies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    parameters_json TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_id INTEGER NOT NULL REFERENCES strategies(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    signal_type TEXT NOT NULL,
    signal_strength REAL NOT NULL,
    value REAL,
    metadata_json TEXT,
    timestamp TEXT NOT NULL,
    signal_day TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_signal_per_day
    ON signals(strategy_id, ticker, signal_type, signal_day);
CREATE INDEX IF NOT EXISTS idx_signals_ticker_ts ON signals(ticker, timestamp);
";

fn query_err(e: rusqlite::Error) -> QuantvaultError {
    QuantvaultError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_err<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, TS_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn opt_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| NaiveDateTime::parse_from_str(&s, TS_FORMAT).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| serde_json::from_str(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = QuantvaultError>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_err(idx, e))
}

fn to_json_text(value: &Option<serde_json::Value>) -> Result<Option<String>, QuantvaultError> {
    Ok(value.as_ref().map(serde_json::to_string).transpose()?)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, QuantvaultError> {
    rows.map(|r| r.map_err(query_err)).collect()
}

const BAR_COLUMNS: &str = "ticker, interval, timestamp, open, high, low, close, volume";

fn bar_from_row(row: &Row<'_>) -> rusqlite::Result<PriceBar> {
    Ok(PriceBar {
        ticker: row.get(0)?,
        interval: parsed_column::<Interval>(row, 1)?,
        timestamp: ts_column(row, 2)?,
        open: row.get(3)?,
        high: row.get(4)?,
        low: row.get(5)?,
        close: row.get(6)?,
        volume: row.get(7)?,
    })
}

const STRATEGY_COLUMNS: &str =
    "id, name, description, parameters_json, is_active, created_at, updated_at";

fn strategy_from_row(row: &Row<'_>) -> rusqlite::Result<Strategy> {
    Ok(Strategy {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parameters: json_column(row, 3)?,
        is_active: row.get(4)?,
        created_at: ts_column(row, 5)?,
        updated_at: ts_column(row, 6)?,
    })
}

fn find_strategy_in(conn: &Connection, id: i64) -> Result<Option<Strategy>, QuantvaultError> {
    conn.query_row(
        &format!("SELECT {STRATEGY_COLUMNS} FROM strategies WHERE id = ?1"),
        params![id],
        strategy_from_row,
    )
    .optional()
    .map_err(query_err)
}

fn strategy_not_found(id: i64) -> QuantvaultError {
    QuantvaultError::NotFound {
        entity: "strategy".to_string(),
        key: id.to_string(),
    }
}

#[derive(Clone)]
pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn open(settings: &DatabaseSettings) -> Result<Self, QuantvaultError> {
        let manager = SqliteConnectionManager::file(&settings.path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| QuantvaultError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    /// Private in-memory database on a single pooled connection.
    pub fn in_memory() -> Result<Self, QuantvaultError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| QuantvaultError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, QuantvaultError> {
        self.pool.get().map_err(|e: r2d2::Error| QuantvaultError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), QuantvaultError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    /// Insert or replace bars in one transaction. Returns the number written.
    pub fn import_bars(&self, bars: &[PriceBar]) -> Result<usize, QuantvaultError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for bar in bars {
            upsert_bar_in(&tx, bar)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }

    /// Reference-data loader for securities; keeps overview fields already stored
    /// unless new ones are given.
    pub fn upsert_security(&self, security: &Security) -> Result<(), QuantvaultError> {
        self.conn()?
            .execute(
                "INSERT INTO securities (ticker, name, price, sector, beta, overview_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(ticker) DO UPDATE SET
                    name = excluded.name,
                    price = excluded.price,
                    sector = COALESCE(excluded.sector, securities.sector),
                    beta = COALESCE(excluded.beta, securities.beta),
                    overview_updated_at = COALESCE(excluded.overview_updated_at, securities.overview_updated_at)",
                params![
                    security.ticker,
                    security.name,
                    security.price,
                    security.sector,
                    security.beta,
                    security.overview_updated_at.map(format_ts),
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    /// Ledger loader. Returns the new trade id.
    pub fn insert_trade(
        &self,
        ticker: &str,
        side: TradeSide,
        quantity: f64,
        price: f64,
        status: TradeStatus,
    ) -> Result<i64, QuantvaultError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trades (ticker, side, quantity, price, status) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![ticker, side.as_str(), quantity, price, status.as_str()],
        )
        .map_err(query_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_trade_status(&self, id: i64, status: TradeStatus) -> Result<(), QuantvaultError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE trades SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(query_err)?;
        if changed == 0 {
            return Err(QuantvaultError::NotFound {
                entity: "trade".to_string(),
                key: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn count_indicator_rows(&self, ticker: &str, indicator_type: &str) -> Result<usize, QuantvaultError> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM indicator_values WHERE ticker = ?1 AND indicator_type = ?2",
                params![ticker, indicator_type],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        Ok(count as usize)
    }
}

fn upsert_bar_in(conn: &Connection, bar: &PriceBar) -> Result<(), QuantvaultError> {
    conn.execute(
        "INSERT INTO price_bars (ticker, interval, timestamp, open, high, low, close, volume)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(ticker, interval, timestamp) DO UPDATE SET
            open = excluded.open,
            high = excluded.high,
            low = excluded.low,
            close = excluded.close,
            volume = excluded.volume",
        params![
            bar.ticker,
            bar.interval.as_str(),
            format_ts(bar.timestamp),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
        ],
    )
    .map_err(query_err)?;
    Ok(())
}

impl PriceBarPort for SqliteAdapter {
    fn fetch_bars(
        &self,
        ticker: &str,
        interval: Interval,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {BAR_COLUMNS} FROM price_bars
                 WHERE ticker = ?1 AND interval = ?2 AND substr(timestamp, 1, 10) BETWEEN ?3 AND ?4
                 ORDER BY timestamp ASC"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![
                    ticker,
                    interval.as_str(),
                    format_date(start_date),
                    format_date(end_date)
                ],
                bar_from_row,
            )
            .map_err(query_err)?;
        collect_rows(rows)
    }

    fn fetch_daily_bars(
        &self,
        ticker: Option<&str>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {BAR_COLUMNS} FROM price_bars
                 WHERE interval = 'daily'
                   AND (?1 IS NULL OR ticker = ?1)
                   AND substr(timestamp, 1, 10) BETWEEN ?2 AND ?3
                 ORDER BY ticker ASC, timestamp ASC"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![ticker, format_date(start_date), format_date(end_date)],
                bar_from_row,
            )
            .map_err(query_err)?;
        collect_rows(rows)
    }

    fn find_bar(
        &self,
        ticker: &str,
        interval: Interval,
        timestamp: NaiveDateTime,
    ) -> Result<Option<PriceBar>, QuantvaultError> {
        self.conn()?
            .query_row(
                &format!(
                    "SELECT {BAR_COLUMNS} FROM price_bars
                     WHERE ticker = ?1 AND interval = ?2 AND timestamp = ?3"
                ),
                params![ticker, interval.as_str(), format_ts(timestamp)],
                bar_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn insert_bar_if_absent(&self, bar: &PriceBar) -> Result<bool, QuantvaultError> {
        let inserted = self
            .conn()?
            .execute(
                "INSERT INTO price_bars (ticker, interval, timestamp, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(ticker, interval, timestamp) DO NOTHING",
                params![
                    bar.ticker,
                    bar.interval.as_str(),
                    format_ts(bar.timestamp),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ],
            )
            .map_err(query_err)?;
        Ok(inserted == 1)
    }

    fn upsert_bar(&self, bar: &PriceBar) -> Result<(), QuantvaultError> {
        upsert_bar_in(&*self.conn()?, bar)
    }
}

const INDICATOR_COLUMNS: &str = "ticker, indicator_type, timestamp, value, parameters_json";

fn indicator_from_row(row: &Row<'_>) -> rusqlite::Result<IndicatorRecord> {
    Ok(IndicatorRecord {
        ticker: row.get(0)?,
        indicator_type: row.get(1)?,
        timestamp: ts_column(row, 2)?,
        value: row.get(3)?,
        parameters: json_column(row, 4)?,
    })
}

impl IndicatorPort for SqliteAdapter {
    fn upsert_indicator_values(&self, records: &[IndicatorRecord]) -> Result<usize, QuantvaultError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO indicator_values (ticker, indicator_type, timestamp, value, parameters_json)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(ticker, indicator_type, timestamp) DO UPDATE SET
                        value = excluded.value,
                        parameters_json = excluded.parameters_json",
                )
                .map_err(query_err)?;
            for record in records {
                stmt.execute(params![
                    record.ticker,
                    record.indicator_type,
                    format_ts(record.timestamp),
                    record.value,
                    to_json_text(&record.parameters)?,
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(records.len())
    }

    fn fetch_indicator_values(
        &self,
        ticker: &str,
        indicator_type: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<IndicatorRecord>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {INDICATOR_COLUMNS} FROM indicator_values
                 WHERE ticker = ?1 AND indicator_type = ?2
                   AND substr(timestamp, 1, 10) BETWEEN ?3 AND ?4
                 ORDER BY timestamp ASC"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![
                    ticker,
                    indicator_type,
                    format_date(start_date),
                    format_date(end_date)
                ],
                indicator_from_row,
            )
            .map_err(query_err)?;
        collect_rows(rows)
    }

    fn latest_indicator_value(
        &self,
        ticker: &str,
        indicator_type: &str,
    ) -> Result<Option<IndicatorRecord>, QuantvaultError> {
        self.conn()?
            .query_row(
                &format!(
                    "SELECT {INDICATOR_COLUMNS} FROM indicator_values
                     WHERE ticker = ?1 AND indicator_type = ?2
                     ORDER BY timestamp DESC LIMIT 1"
                ),
                params![ticker, indicator_type],
                indicator_from_row,
            )
            .optional()
            .map_err(query_err)
    }
}

impl TradeLedgerPort for SqliteAdapter {
    fn active_trades(&self) -> Result<Vec<Trade>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, ticker, side, quantity, price, status FROM trades
                 WHERE status = 'ACTIVE' ORDER BY id ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Trade {
                    id: row.get(0)?,
                    ticker: row.get(1)?,
                    side: parsed_column::<TradeSide>(row, 2)?,
                    quantity: row.get(3)?,
                    price: row.get(4)?,
                    status: parsed_column::<TradeStatus>(row, 5)?,
                })
            })
            .map_err(query_err)?;
        collect_rows(rows)
    }
}

impl SecurityPort for SqliteAdapter {
    fn securities(&self) -> Result<Vec<Security>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticker, name, price, sector, beta, overview_updated_at
                 FROM securities ORDER BY ticker ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Security {
                    ticker: row.get(0)?,
                    name: row.get(1)?,
                    price: row.get(2)?,
                    sector: row.get(3)?,
                    beta: row.get(4)?,
                    overview_updated_at: opt_ts_column(row, 5)?,
                })
            })
            .map_err(query_err)?;
        collect_rows(rows)
    }

    fn update_price(&self, ticker: &str, price: f64) -> Result<(), QuantvaultError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE securities SET price = ?1 WHERE ticker = ?2",
                params![price, ticker],
            )
            .map_err(query_err)?;
        if changed == 0 {
            return Err(QuantvaultError::NotFound {
                entity: "security".to_string(),
                key: ticker.to_string(),
            });
        }
        Ok(())
    }

    fn update_overview(
        &self,
        ticker: &str,
        beta: Option<f64>,
        sector: Option<&str>,
        updated_at: NaiveDateTime,
    ) -> Result<(), QuantvaultError> {
        self.conn()?
            .execute(
                "UPDATE securities
                 SET beta = COALESCE(?1, beta), sector = COALESCE(?2, sector), overview_updated_at = ?3
                 WHERE ticker = ?4",
                params![beta, sector, format_ts(updated_at), ticker],
            )
            .map_err(query_err)?;
        Ok(())
    }
}

impl HoldingsPort for SqliteAdapter {
    fn replace_materialized(
        &self,
        rows: &[MaterializedHolding],
        computed_at: NaiveDateTime,
    ) -> Result<(), QuantvaultError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        tx.execute("DELETE FROM materialized_holdings", [])
            .map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO materialized_holdings (ticker, net_quantity, average_cost,
                        market_value, cost_basis, unrealized_pnl, unrealized_pnl_pct, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(query_err)?;
            for row in rows {
                stmt.execute(params![
                    row.ticker,
                    row.net_quantity,
                    row.average_cost,
                    row.market_value,
                    row.cost_basis,
                    row.unrealized_pnl,
                    row.unrealized_pnl_pct,
                    format_ts(row.last_updated),
                ])
                .map_err(query_err)?;
            }
        }
        tx.execute(
            "INSERT INTO holdings_state (id, computed_at) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET computed_at = excluded.computed_at",
            params![format_ts(computed_at)],
        )
        .map_err(query_err)?;
        tx.commit().map_err(query_err)
    }

    fn load_materialized(&self) -> Result<Option<Vec<MaterializedHolding>>, QuantvaultError> {
        let conn = self.conn()?;
        let computed: Option<String> = conn
            .query_row("SELECT computed_at FROM holdings_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(query_err)?;
        if computed.is_none() {
            return Ok(None);
        }

        let mut stmt = conn
            .prepare(
                "SELECT ticker, net_quantity, average_cost, market_value, cost_basis,
                        unrealized_pnl, unrealized_pnl_pct, last_updated
                 FROM materialized_holdings ORDER BY ticker ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MaterializedHolding {
                    ticker: row.get(0)?,
                    net_quantity: row.get(1)?,
                    average_cost: row.get(2)?,
                    market_value: row.get(3)?,
                    cost_basis: row.get(4)?,
                    unrealized_pnl: row.get(5)?,
                    unrealized_pnl_pct: row.get(6)?,
                    last_updated: ts_column(row, 7)?,
                })
            })
            .map_err(query_err)?;
        Ok(Some(collect_rows(rows)?))
    }
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<PortfolioSnapshot> {
    Ok(PortfolioSnapshot {
        snapshot_date: date_column(row, 0)?,
        total_market_value: row.get(1)?,
        total_cost_basis: row.get(2)?,
        total_pnl: row.get(3)?,
        total_pnl_pct: row.get(4)?,
        breakdown: json_column(row, 5)?.unwrap_or(serde_json::Value::Null),
    })
}

const SNAPSHOT_COLUMNS: &str =
    "snapshot_date, total_market_value, total_cost_basis, total_pnl, total_pnl_pct, breakdown_json";

impl SnapshotPort for SqliteAdapter {
    fn snapshots(&self) -> Result<Vec<PortfolioSnapshot>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM portfolio_snapshots ORDER BY snapshot_date ASC"
            ))
            .map_err(query_err)?;
        let rows = stmt.query_map([], snapshot_from_row).map_err(query_err)?;
        collect_rows(rows)
    }

    fn find_snapshot(&self, date: NaiveDate) -> Result<Option<PortfolioSnapshot>, QuantvaultError> {
        self.conn()?
            .query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM portfolio_snapshots WHERE snapshot_date = ?1"),
                params![format_date(date)],
                snapshot_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), QuantvaultError> {
        let breakdown = serde_json::to_string(&snapshot.breakdown)?;
        self.conn()?
            .execute(
                "INSERT INTO portfolio_snapshots (snapshot_date, total_market_value,
                    total_cost_basis, total_pnl, total_pnl_pct, breakdown_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(snapshot_date) DO UPDATE SET
                    total_market_value = excluded.total_market_value,
                    total_cost_basis = excluded.total_cost_basis,
                    total_pnl = excluded.total_pnl,
                    total_pnl_pct = excluded.total_pnl_pct,
                    breakdown_json = excluded.breakdown_json",
                params![
                    format_date(snapshot.snapshot_date),
                    snapshot.total_market_value,
                    snapshot.total_cost_basis,
                    snapshot.total_pnl,
                    snapshot.total_pnl_pct,
                    breakdown,
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }
}

impl StrategyPort for SqliteAdapter {
    fn create_strategy(&self, strategy: &NewStrategy) -> Result<Strategy, QuantvaultError> {
        let conn = self.conn()?;
        let now = format_ts(Utc::now().naive_utc());
        let result = conn.execute(
            "INSERT INTO strategies (name, description, parameters_json, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                strategy.name,
                strategy.description,
                to_json_text(&strategy.parameters)?,
                strategy.is_active,
                now,
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(QuantvaultError::Duplicate {
                    entity: "strategy".to_string(),
                    key: strategy.name.clone(),
                })
            }
            Err(e) => return Err(query_err(e)),
        }
        let id = conn.last_insert_rowid();
        find_strategy_in(&conn, id)?.ok_or_else(|| strategy_not_found(id))
    }

    fn update_strategy(&self, id: i64, update: &StrategyUpdate) -> Result<Strategy, QuantvaultError> {
        let conn = self.conn()?;
        let current = find_strategy_in(&conn, id)?.ok_or_else(|| strategy_not_found(id))?;

        let name = update.name.clone().unwrap_or(current.name);
        let description = match &update.description {
            Some(replacement) => replacement.clone(),
            None => current.description,
        };
        let parameters = update.parameters.clone().or(current.parameters);
        let is_active = update.is_active.unwrap_or(current.is_active);

        let result = conn.execute(
            "UPDATE strategies
             SET name = ?1, description = ?2, parameters_json = ?3, is_active = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                name,
                description,
                to_json_text(&parameters)?,
                is_active,
                format_ts(Utc::now().naive_utc()),
                id,
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(QuantvaultError::Duplicate {
                    entity: "strategy".to_string(),
                    key: name,
                })
            }
            Err(e) => return Err(query_err(e)),
        }
        find_strategy_in(&conn, id)?.ok_or_else(|| strategy_not_found(id))
    }

    fn delete_strategy(&self, id: i64) -> Result<(), QuantvaultError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM strategies WHERE id = ?1", params![id])
            .map_err(query_err)?;
        if changed == 0 {
            return Err(strategy_not_found(id));
        }
        Ok(())
    }

    fn list_strategies(&self) -> Result<Vec<Strategy>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {STRATEGY_COLUMNS} FROM strategies ORDER BY name ASC"))
            .map_err(query_err)?;
        let rows = stmt.query_map([], strategy_from_row).map_err(query_err)?;
        collect_rows(rows)
    }

    fn active_strategies(&self) -> Result<Vec<Strategy>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {STRATEGY_COLUMNS} FROM strategies WHERE is_active = 1 ORDER BY id ASC"
            ))
            .map_err(query_err)?;
        let rows = stmt.query_map([], strategy_from_row).map_err(query_err)?;
        collect_rows(rows)
    }
}

impl SignalPort for SqliteAdapter {
    fn insert_signal_if_absent(&self, signal: &Signal) -> Result<bool, QuantvaultError> {
        let metadata = serde_json::to_string(&signal.metadata)?;
        let inserted = self
            .conn()?
            .execute(
                "INSERT INTO signals (strategy_id, ticker, signal_type, signal_strength, value,
                    metadata_json, timestamp, signal_day)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(strategy_id, ticker, signal_type, signal_day) DO NOTHING",
                params![
                    signal.strategy_id,
                    signal.ticker,
                    signal.signal_type.as_str(),
                    signal.strength,
                    signal.value,
                    metadata,
                    format_ts(signal.timestamp),
                    format_date(signal.signal_day()),
                ],
            )
            .map_err(query_err)?;
        Ok(inserted == 1)
    }

    fn list_signals(&self, filter: &SignalFilter) -> Result<Vec<Signal>, QuantvaultError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, strategy_id, ticker, signal_type, signal_strength, value,
                        metadata_json, timestamp
                 FROM signals
                 WHERE (?1 IS NULL OR ticker = ?1) AND (?2 IS NULL OR strategy_id = ?2)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![filter.ticker, filter.strategy_id, filter.limit as i64],
                |row| {
                    Ok(Signal {
                        id: row.get(0)?,
                        strategy_id: row.get(1)?,
                        ticker: row.get(2)?,
                        signal_type: parsed_column(row, 3)?,
                        strength: row.get(4)?,
                        value: row.get(5)?,
                        metadata: json_column(row, 6)?.unwrap_or(serde_json::Value::Null),
                        timestamp: ts_column(row, 7)?,
                    })
                },
            )
            .map_err(query_err)?;
        collect_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::SignalType;
    use serde_json::json;

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn bar(ticker: &str, m: u32, d: u32, close: f64) -> PriceBar {
        PriceBar::daily(ticker, date(m, d), close, close + 1.0, close - 1.0, close, Some(100.0))
    }

    #[test]
    fn schema_initialization_is_repeatable() {
        let adapter = adapter();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn fetch_bars_filters_by_inclusive_date_range() {
        let adapter = adapter();
        adapter
            .import_bars(&[bar("BHP", 1, 1, 10.0), bar("BHP", 1, 2, 11.0), bar("BHP", 1, 3, 12.0)])
            .unwrap();

        let fetched = adapter
            .fetch_bars("BHP", Interval::Daily, date(1, 2), date(1, 3))
            .unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].close, 11.0);
        assert_eq!(fetched[1].date(), date(1, 3));
        assert_eq!(fetched[1].volume, Some(100.0));
    }

    #[test]
    fn daily_bars_for_all_tickers_are_grouped() {
        let adapter = adapter();
        adapter
            .import_bars(&[bar("ZZZ", 1, 1, 1.0), bar("AAA", 1, 2, 2.0), bar("AAA", 1, 1, 3.0)])
            .unwrap();
        let all = adapter.fetch_daily_bars(None, date(1, 1), date(1, 31)).unwrap();
        let keys: Vec<(String, NaiveDate)> = all.iter().map(|b| (b.ticker.clone(), b.date())).collect();
        assert_eq!(
            keys,
            vec![
                ("AAA".to_string(), date(1, 1)),
                ("AAA".to_string(), date(1, 2)),
                ("ZZZ".to_string(), date(1, 1)),
            ]
        );
        let one = adapter.fetch_daily_bars(Some("ZZZ"), date(1, 1), date(1, 31)).unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn insert_if_absent_never_overwrites() {
        let adapter = adapter();
        assert!(adapter.insert_bar_if_absent(&bar("BHP", 1, 1, 10.0)).unwrap());
        assert!(!adapter.insert_bar_if_absent(&bar("BHP", 1, 1, 99.0)).unwrap());
        let stored = adapter
            .find_bar("BHP", Interval::Daily, bar("BHP", 1, 1, 0.0).timestamp)
            .unwrap()
            .unwrap();
        assert_eq!(stored.close, 10.0);
    }

    #[test]
    fn indicator_upsert_keeps_one_row_per_key() {
        let adapter = adapter();
        let ts = date(2, 1).and_hms_opt(0, 0, 0).unwrap();
        let record = |value: f64| IndicatorRecord {
            ticker: "BHP".to_string(),
            indicator_type: "BB_20".to_string(),
            timestamp: ts,
            value: Some(value),
            parameters: Some(json!({"upper": value + 1.0, "lower": value - 1.0})),
        };
        adapter.upsert_indicator_values(&[record(10.0)]).unwrap();
        adapter.upsert_indicator_values(&[record(12.0)]).unwrap();

        assert_eq!(adapter.count_indicator_rows("BHP", "BB_20").unwrap(), 1);
        let latest = adapter.latest_indicator_value("BHP", "BB_20").unwrap().unwrap();
        assert_eq!(latest.value, Some(12.0));
        assert_eq!(latest.parameters.unwrap()["upper"], 13.0);
    }

    #[test]
    fn materialized_state_distinguishes_never_from_empty() {
        let adapter = adapter();
        assert!(adapter.load_materialized().unwrap().is_none());

        let at = date(3, 1).and_hms_opt(9, 30, 0).unwrap();
        adapter.replace_materialized(&[], at).unwrap();
        assert_eq!(adapter.load_materialized().unwrap(), Some(vec![]));
    }

    #[test]
    fn replace_materialized_drops_old_rows() {
        let adapter = adapter();
        let at = date(3, 1).and_hms_opt(9, 30, 0).unwrap();
        let row = |ticker: &str| MaterializedHolding {
            ticker: ticker.to_string(),
            net_quantity: 1.0,
            average_cost: 1.0,
            market_value: 1.0,
            cost_basis: 1.0,
            unrealized_pnl: 0.0,
            unrealized_pnl_pct: None,
            last_updated: at,
        };
        adapter.replace_materialized(&[row("A"), row("B")], at).unwrap();
        adapter.replace_materialized(&[row("C")], at).unwrap();
        let rows = adapter.load_materialized().unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker, "C");
        assert_eq!(rows[0].last_updated, at);
    }

    #[test]
    fn snapshot_upsert_overwrites_same_day() {
        let adapter = adapter();
        let mut snap = PortfolioSnapshot {
            snapshot_date: date(4, 1),
            total_market_value: 100.0,
            total_cost_basis: 90.0,
            total_pnl: 10.0,
            total_pnl_pct: Some(11.1),
            breakdown: json!([{"ticker": "A"}]),
        };
        adapter.upsert_snapshot(&snap).unwrap();
        snap.total_market_value = 120.0;
        adapter.upsert_snapshot(&snap).unwrap();

        let all = adapter.snapshots().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].total_market_value, 120.0);
        assert_eq!(all[0].breakdown[0]["ticker"], "A");
        assert!(adapter.find_snapshot(date(4, 2)).unwrap().is_none());
    }

    #[test]
    fn ledger_and_securities_round_trip() {
        let adapter = adapter();
        adapter
            .upsert_security(&Security {
                ticker: "AAPL".to_string(),
                name: "Apple".to_string(),
                price: 190.0,
                sector: Some("Technology".to_string()),
                beta: Some(1.2),
                overview_updated_at: None,
            })
            .unwrap();
        adapter.update_price("AAPL", 195.5).unwrap();
        assert!(matches!(
            adapter.update_price("NOPE", 1.0),
            Err(QuantvaultError::NotFound { .. })
        ));

        let buy = adapter
            .insert_trade("AAPL", TradeSide::Buy, 10.0, 100.0, TradeStatus::Active)
            .unwrap();
        let sell = adapter
            .insert_trade("AAPL", TradeSide::Sell, 3.0, 120.0, TradeStatus::Active)
            .unwrap();
        adapter.set_trade_status(sell, TradeStatus::Rejected).unwrap();

        let trades = adapter.active_trades().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, buy);
        assert_eq!(trades[0].side, TradeSide::Buy);

        let securities = adapter.securities().unwrap();
        assert_eq!(securities[0].price, 195.5);
        assert_eq!(securities[0].beta, Some(1.2));
    }

    #[test]
    fn partial_overview_keeps_stored_beta_and_sector() {
        let adapter = adapter();
        adapter
            .upsert_security(&Security {
                ticker: "AAPL".to_string(),
                name: "Apple".to_string(),
                price: 190.0,
                sector: None,
                beta: None,
                overview_updated_at: None,
            })
            .unwrap();
        let first = date(6, 3).and_hms_opt(16, 0, 0).unwrap();
        let second = date(6, 4).and_hms_opt(16, 0, 0).unwrap();

        adapter
            .update_overview("AAPL", Some(1.25), Some("Technology"), first)
            .unwrap();
        adapter.update_overview("AAPL", None, None, second).unwrap();

        let security = &adapter.securities().unwrap()[0];
        assert_eq!(security.beta, Some(1.25));
        assert_eq!(security.sector.as_deref(), Some("Technology"));
        assert_eq!(security.overview_updated_at, Some(second));
    }

    #[test]
    fn strategy_names_are_unique() {
        let adapter = adapter();
        let new = NewStrategy {
            name: "RSI Reversion".to_string(),
            description: None,
            parameters: Some(json!({"oversold": 25})),
            is_active: true,
        };
        let created = adapter.create_strategy(&new).unwrap();
        assert_eq!(created.parameters, Some(json!({"oversold": 25})));
        assert!(matches!(
            adapter.create_strategy(&new),
            Err(QuantvaultError::Duplicate { .. })
        ));

        let updated = adapter
            .update_strategy(created.id, &StrategyUpdate::set_active(false))
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.name, "RSI Reversion");
        assert!(adapter.active_strategies().unwrap().is_empty());

        let described = adapter
            .update_strategy(
                created.id,
                &StrategyUpdate {
                    description: Some(Some("Mean reversion on RSI".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(described.description.as_deref(), Some("Mean reversion on RSI"));
        let untouched = adapter
            .update_strategy(created.id, &StrategyUpdate::set_active(true))
            .unwrap();
        assert_eq!(untouched.description.as_deref(), Some("Mean reversion on RSI"));
        let cleared = adapter
            .update_strategy(
                created.id,
                &StrategyUpdate {
                    description: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.description, None);
        assert!(cleared.is_active);

        adapter.delete_strategy(created.id).unwrap();
        assert!(matches!(
            adapter.delete_strategy(created.id),
            Err(QuantvaultError::NotFound { .. })
        ));
    }

    #[test]
    fn one_signal_per_strategy_ticker_type_and_day() {
        let adapter = adapter();
        let strategy = adapter
            .create_strategy(&NewStrategy {
                name: "RSI".to_string(),
                description: None,
                parameters: None,
                is_active: true,
            })
            .unwrap();
        let signal = |ts: NaiveDateTime| Signal {
            id: None,
            strategy_id: strategy.id,
            ticker: "AAPL".to_string(),
            signal_type: SignalType::Buy,
            strength: 0.4,
            value: Some(18.0),
            metadata: json!({"indicator": "RSI_14"}),
            timestamp: ts,
        };
        let morning = date(5, 1).and_hms_opt(9, 0, 0).unwrap();
        let evening = date(5, 1).and_hms_opt(17, 0, 0).unwrap();
        let next_day = date(5, 2).and_hms_opt(9, 0, 0).unwrap();

        assert!(adapter.insert_signal_if_absent(&signal(morning)).unwrap());
        assert!(!adapter.insert_signal_if_absent(&signal(evening)).unwrap());
        assert!(adapter.insert_signal_if_absent(&signal(next_day)).unwrap());

        let listed = adapter
            .list_signals(&SignalFilter {
                ticker: Some("AAPL".to_string()),
                ..SignalFilter::default()
            })
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].timestamp, next_day);
        assert_eq!(listed[0].metadata["indicator"], "RSI_14");
    }
}
