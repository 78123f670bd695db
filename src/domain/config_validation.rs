//! Settings assembly and validation.
//!
//! Every command validates its configuration up front so that a bad value is
//! reported before the store or the provider is touched.

use crate::domain::error::QuantvaultError;
use crate::ports::config_port::ConfigPort;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "quantvault.db";
pub const DEFAULT_POOL_SIZE: i64 = 4;
pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
/// Free-tier Alpha Vantage allows five calls per minute.
pub const DEFAULT_MIN_CALL_INTERVAL_SECS: f64 = 12.0;
pub const DEFAULT_QUOTE_CACHE_TTL_SECS: i64 = 900;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    pub path: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataSettings {
    pub api_key: String,
    pub base_url: String,
    pub min_call_interval: Duration,
    pub quote_cache_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub database: DatabaseSettings,
    pub risk_free_rate: f64,
}

pub fn database_settings(config: &dyn ConfigPort) -> Result<DatabaseSettings, QuantvaultError> {
    let path = config
        .get_string("database", "path")
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

    let pool_size = config.get_int("database", "pool_size", DEFAULT_POOL_SIZE);
    if !(1..=64).contains(&pool_size) {
        return Err(QuantvaultError::ConfigInvalid {
            section: "database".to_string(),
            key: "pool_size".to_string(),
            reason: "pool_size must be between 1 and 64".to_string(),
        });
    }

    Ok(DatabaseSettings {
        path,
        pool_size: pool_size as u32,
    })
}

/// Provider settings. Only commands that call the provider ask for these, so a
/// missing API key does not block offline commands.
pub fn market_data_settings(
    config: &dyn ConfigPort,
) -> Result<MarketDataSettings, QuantvaultError> {
    let api_key = config.require_string("market_data", "api_key")?;

    let base_url = config
        .get_string("market_data", "base_url")
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(QuantvaultError::ConfigInvalid {
            section: "market_data".to_string(),
            key: "base_url".to_string(),
            reason: "base_url must be an http(s) URL".to_string(),
        });
    }

    let interval = config.get_double(
        "market_data",
        "min_call_interval_secs",
        DEFAULT_MIN_CALL_INTERVAL_SECS,
    );
    if !interval.is_finite() || interval < 0.0 {
        return Err(QuantvaultError::ConfigInvalid {
            section: "market_data".to_string(),
            key: "min_call_interval_secs".to_string(),
            reason: "min_call_interval_secs must be non-negative".to_string(),
        });
    }

    let ttl = config.get_int(
        "market_data",
        "quote_cache_ttl_secs",
        DEFAULT_QUOTE_CACHE_TTL_SECS,
    );
    if ttl < 0 {
        return Err(QuantvaultError::ConfigInvalid {
            section: "market_data".to_string(),
            key: "quote_cache_ttl_secs".to_string(),
            reason: "quote_cache_ttl_secs must be non-negative".to_string(),
        });
    }

    Ok(MarketDataSettings {
        api_key,
        base_url,
        min_call_interval: Duration::from_secs_f64(interval),
        quote_cache_ttl: Duration::from_secs(ttl as u64),
    })
}

pub fn app_settings(config: &dyn ConfigPort) -> Result<AppSettings, QuantvaultError> {
    let database = database_settings(config)?;

    let risk_free_rate = config.get_double("risk", "risk_free_rate", DEFAULT_RISK_FREE_RATE);
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(QuantvaultError::ConfigInvalid {
            section: "risk".to_string(),
            key: "risk_free_rate".to_string(),
            reason: "risk_free_rate must be between 0 and 1".to_string(),
        });
    }

    Ok(AppSettings {
        database,
        risk_free_rate,
    })
}
