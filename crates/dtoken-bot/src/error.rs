//! Application error types.

use thiserror::Error;

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Signal error: {0}")]
    Signal(#[from] signal_client::SignalError),

    #[error("Storage error: {0}")]
    Storage(#[from] registration_store::StorageError),

    #[error("Token error: {0}")]
    Token(#[from] registration_store::TokenError),
}

/// Result type alias for application errors.
pub type AppResult<T> = Result<T, AppError>;
