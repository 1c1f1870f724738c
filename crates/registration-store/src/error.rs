//! Registration storage errors.

use crate::types::DToken;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the registration store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection pool closed")]
    PoolClosed,

    #[error("D-Token {0} is already assigned to another phone number")]
    TokenConflict(DToken),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure issuing a fresh D-Token.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("No free D-Token found after {attempts} candidates")]
    Exhausted { attempts: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Input that is not a 10-digit phone number.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Not a 10-digit phone number: {0:?}")]
pub struct ValidationError(pub String);

/// Numeric value outside the D-Token range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("D-Token out of range: {0}")]
pub struct InvalidToken(pub u64);
