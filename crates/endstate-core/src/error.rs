use thiserror::Error;

/// Top-level error type for the Endstate platform.
#[derive(Error, Debug)]
pub enum EndstateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid session id: {0}")]
    InvalidSession(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for EndstateError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
