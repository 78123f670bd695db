//! CSV fixture loaders for price history and the trade ledger.
//!
//! Price files live in one directory as `<TICKER>.csv` with a
//! `date,open,high,low,close,volume` header; volume may be blank. Ledger
//! files are single CSVs for securities and trades.

use crate::domain::error::QuantvaultError;
use crate::domain::ohlcv::{normalize_ticker, PriceBar};
use crate::domain::position::{Security, TradeSide, TradeStatus};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A trade row as read from a ledger file, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    pub ticker: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub status: TradeStatus,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

fn parse_err(path: &Path, line: usize, reason: impl std::fmt::Display) -> QuantvaultError {
    QuantvaultError::invalid_input(format!("{}:{}: {}", path.display(), line, reason))
}

fn read_records(path: &Path) -> Result<Vec<csv::StringRecord>, QuantvaultError> {
    let content = fs::read_to_string(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    rdr.records()
        .map(|r| r.map_err(|e| parse_err(path, 0, format!("CSV parse error: {e}"))))
        .collect()
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    name: &str,
    path: &Path,
    line: usize,
) -> Result<&'r str, QuantvaultError> {
    record
        .get(idx)
        .ok_or_else(|| parse_err(path, line, format!("missing {name} column")))
}

fn parsed<T>(raw: &str, name: &str, path: &Path, line: usize) -> Result<T, QuantvaultError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| parse_err(path, line, format!("invalid {name} value {raw:?}: {e}")))
}

fn optional<T>(raw: Option<&str>, name: &str, path: &Path, line: usize) -> Result<Option<T>, QuantvaultError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parsed(s, name, path, line).map(Some),
        None => Ok(None),
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}.csv"))
    }

    /// Daily bars for one ticker, ascending by date.
    pub fn read_bars(&self, ticker: &str) -> Result<Vec<PriceBar>, QuantvaultError> {
        let ticker = normalize_ticker(ticker);
        let path = self.csv_path(&ticker);
        let mut bars = Vec::new();

        for (i, record) in read_records(&path)?.iter().enumerate() {
            let line = i + 2;
            let date: NaiveDate = {
                let raw = field(record, 0, "date", &path, line)?;
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|e| parse_err(&path, line, format!("invalid date format: {e}")))?
            };
            let open = parsed(field(record, 1, "open", &path, line)?, "open", &path, line)?;
            let high = parsed(field(record, 2, "high", &path, line)?, "high", &path, line)?;
            let low = parsed(field(record, 3, "low", &path, line)?, "low", &path, line)?;
            let close = parsed(field(record, 4, "close", &path, line)?, "close", &path, line)?;
            let volume = optional(record.get(5), "volume", &path, line)?;

            bars.push(PriceBar::daily(&ticker, date, open, high, low, close, volume));
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    /// Tickers with a price file in the base directory, sorted.
    pub fn list_symbols(&self) -> Result<Vec<String>, QuantvaultError> {
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(ticker) = name.strip_suffix(".csv") {
                symbols.push(normalize_ticker(ticker));
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

/// `ticker,name,price,sector,beta`; sector and beta may be blank.
pub fn read_securities(path: &Path) -> Result<Vec<Security>, QuantvaultError> {
    read_records(path)?
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let line = i + 2;
            Ok(Security {
                ticker: normalize_ticker(field(record, 0, "ticker", path, line)?),
                name: field(record, 1, "name", path, line)?.to_string(),
                price: parsed(field(record, 2, "price", path, line)?, "price", path, line)?,
                sector: record
                    .get(3)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                beta: optional(record.get(4), "beta", path, line)?,
                overview_updated_at: None,
            })
        })
        .collect()
}

/// `ticker,side,quantity,price,status`; status defaults to ACTIVE.
pub fn read_trades(path: &Path) -> Result<Vec<TradeRow>, QuantvaultError> {
    read_records(path)?
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let line = i + 2;
            let side = field(record, 1, "side", path, line)?.to_uppercase();
            let status = record
                .get(4)
                .filter(|s| !s.is_empty())
                .map(str::to_uppercase);
            Ok(TradeRow {
                ticker: normalize_ticker(field(record, 0, "ticker", path, line)?),
                side: parsed(&side, "side", path, line)?,
                quantity: parsed(field(record, 2, "quantity", path, line)?, "quantity", path, line)?,
                price: parsed(field(record, 3, "price", path, line)?, "price", path, line)?,
                status: match status {
                    Some(s) => parsed(&s, "status", path, line)?,
                    None => TradeStatus::Active,
                },
            })
        })
        .collect()
}
