use thiserror::Error;
use vigil_core::{ConfigError, EnvelopeError};

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Replay is not running")]
    NotRunning,
}

pub type ReplayResult<T> = Result<T, ReplayError>;
