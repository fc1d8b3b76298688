//! Stream error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("could not acquire pop lock for stream '{0}' within the bound")]
    LockTimeout(String),

    #[error("entry '{0}' not found")]
    NotFound(String),
}
