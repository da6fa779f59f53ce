//! Error types for the Mercado service.

use thiserror::Error;

/// Main error type for Mercado operations.
#[derive(Error, Debug)]
pub enum MercadoError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for MercadoError {
    fn from(err: config::ConfigError) -> Self {
        MercadoError::Config(err.to_string())
    }
}

/// Result type alias for Mercado operations.
pub type Result<T> = std::result::Result<T, MercadoError>;
