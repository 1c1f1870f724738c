//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dtoken_bot::{Dispatcher, RateLimiter};
use registration_store::{
    DToken, PhoneNumber, PoolOptions, Registration, RegistrationStore, SqliteStore,
    StorageError, TokenGenerator, UserRecord,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Rate limiter with the production cooldown.
pub fn test_rate_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(Duration::from_secs(5), Duration::from_secs(600)))
}

/// Dispatcher wired to the given store.
pub fn test_dispatcher(store: Arc<dyn RegistrationStore>) -> Dispatcher {
    Dispatcher::registration(store.clone(), TokenGenerator::new(store), test_rate_limiter())
}

/// SQLite store in a temporary directory; keep the `TempDir` alive.
pub async fn temp_sqlite_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("dtoken.db"), PoolOptions::default())
        .await
        .unwrap();
    (dir, Arc::new(store))
}

/// Extract the D-Token from a reply ending in the token.
pub fn token_from_reply(reply: &str) -> DToken {
    let digits = reply.rsplit(' ').next().unwrap();
    DToken::new(digits.parse().unwrap()).unwrap()
}

/// Store whose backend is always down.
pub struct UnavailableStore;

#[async_trait]
impl RegistrationStore for UnavailableStore {
    async fn find_token_by_phone(&self, _: &PhoneNumber) -> Result<Option<DToken>, StorageError> {
        Err(StorageError::Timeout(Duration::from_secs(5)))
    }

    async fn find_by_phone(&self, _: &PhoneNumber) -> Result<Option<UserRecord>, StorageError> {
        Err(StorageError::Timeout(Duration::from_secs(5)))
    }

    async fn token_exists(&self, _: DToken) -> Result<bool, StorageError> {
        Err(StorageError::Timeout(Duration::from_secs(5)))
    }

    async fn upsert(&self, _: &str, _: &PhoneNumber, _: DToken) -> Result<(), StorageError> {
        Err(StorageError::Timeout(Duration::from_secs(5)))
    }

    async fn insert_if_absent(
        &self,
        _: &str,
        _: &PhoneNumber,
        _: DToken,
    ) -> Result<Registration, StorageError> {
        Err(StorageError::Timeout(Duration::from_secs(5)))
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Err(StorageError::Timeout(Duration::from_secs(5)))
    }
}
