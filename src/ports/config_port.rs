//! Configuration access port.

use crate::domain::error::QuantvaultError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Non-blank string value, or `ConfigMissing`.
    fn require_string(&self, section: &str, key: &str) -> Result<String, QuantvaultError> {
        match self.get_string(section, key) {
            Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Err(QuantvaultError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            }),
        }
    }
}
