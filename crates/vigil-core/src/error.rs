//! Common error types used across all Vigil crates

use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid DSN: {0}")]
    Dsn(#[from] crate::dsn::DsnError),
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
