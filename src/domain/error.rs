//! Domain error types.
//!
//! Business-data conditions (too few bars, a missing price, an empty cache) are
//! never errors; they surface as `None` or status values. This enum covers
//! storage, configuration and caller-contract failures only.

/// Top-level error type for quantvault.
#[derive(Debug, thiserror::Error)]
pub enum QuantvaultError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("{entity} already exists: {key}")]
    Duplicate { entity: String, key: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("price refresh already in progress")]
    RefreshInProgress,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuantvaultError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        QuantvaultError::InvalidInput {
            reason: reason.into(),
        }
    }
}

impl From<&QuantvaultError> for std::process::ExitCode {
    fn from(err: &QuantvaultError) -> Self {
        let code: u8 = match err {
            QuantvaultError::Io(_) => 1,
            QuantvaultError::ConfigParse { .. }
            | QuantvaultError::ConfigMissing { .. }
            | QuantvaultError::ConfigInvalid { .. } => 2,
            QuantvaultError::Database { .. }
            | QuantvaultError::DatabaseQuery { .. }
            | QuantvaultError::Serialization(_) => 3,
            QuantvaultError::NotFound { .. } | QuantvaultError::InvalidInput { .. } => 4,
            QuantvaultError::Duplicate { .. } | QuantvaultError::RefreshInProgress => 5,
        };
        std::process::ExitCode::from(code)
    }
}
