//! Phone number registration storage and D-Token issuance.
//!
//! Every registered phone number maps to exactly one 10-digit D-Token, and
//! no token is shared between phone numbers. Two backends implement
//! [`RegistrationStore`]: a pooled SQLite store for durable data and an
//! in-memory store for tests and ephemeral deployments.

mod error;
mod memory;
mod sqlite;
mod store;
mod token;
mod types;

pub use error::{InvalidToken, StorageError, TokenError, ValidationError};
pub use memory::MemoryStore;
pub use sqlite::{PoolOptions, SqliteStore, SCHEMA_VERSION};
pub use store::RegistrationStore;
pub use token::{TokenGenerator, DEFAULT_MAX_RANDOM_ATTEMPTS, DEFAULT_MAX_SEQUENTIAL_PROBES};
pub use types::*;
