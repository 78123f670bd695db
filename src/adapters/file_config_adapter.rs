//! INI file configuration adapter.

use crate::domain::error::QuantvaultError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

/// Environment variables that override INI values, as `(variable, section, key)`.
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("ALPHA_VANTAGE_API_KEY", "market_data", "api_key"),
    ("QUANTVAULT_DB_PATH", "database", "path"),
];

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, QuantvaultError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| QuantvaultError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, QuantvaultError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| QuantvaultError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    /// Configuration with no file behind it; every lookup falls back to defaults
    /// or environment overrides.
    pub fn empty() -> Self {
        Self { config: Ini::new() }
    }

    pub fn set_override(&mut self, section: &str, key: &str, value: &str) {
        self.config.set(section, key, Some(value.to_string()));
    }

    /// Layer non-empty environment variables over the file values.
    pub fn apply_env_overrides(mut self) -> Self {
        for (var, section, key) in ENV_OVERRIDES {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    tracing::debug!(variable = var, "config value overridden from environment");
                    self.set_override(section, key, value.trim());
                }
            }
        }
        self
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}
