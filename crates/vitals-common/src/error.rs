//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for vitals plumbing
pub type Result<T> = std::result::Result<T, VitalsError>;

/// Errors raised outside the ingestion pipeline proper
/// (configuration, logging setup).
#[derive(Error, Debug)]
pub enum VitalsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl VitalsError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
