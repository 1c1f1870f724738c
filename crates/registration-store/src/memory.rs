//! In-memory registration store.

use crate::error::StorageError;
use crate::store::RegistrationStore;
use crate::types::{DToken, PhoneNumber, Registration, UserRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    /// Records indexed by phone number
    by_phone: HashMap<PhoneNumber, UserRecord>,
    /// Reverse index enforcing token uniqueness
    by_token: HashMap<DToken, PhoneNumber>,
}

/// Registration store kept entirely in process memory.
///
/// Contents are lost on restart. Used when persistence is disabled and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn find_token_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<DToken>, StorageError> {
        Ok(self.tables.read().await.by_phone.get(phone).map(|r| r.d_token))
    }

    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<Option<UserRecord>, StorageError> {
        Ok(self.tables.read().await.by_phone.get(phone).cloned())
    }

    async fn token_exists(&self, token: DToken) -> Result<bool, StorageError> {
        Ok(self.tables.read().await.by_token.contains_key(&token))
    }

    async fn upsert(
        &self,
        username: &str,
        phone: &PhoneNumber,
        token: DToken,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;

        if let Some(owner) = tables.by_token.get(&token) {
            if owner != phone {
                return Err(StorageError::TokenConflict(token));
            }
        }

        let previous = match tables.by_phone.get_mut(phone) {
            Some(record) => Some(std::mem::replace(&mut record.d_token, token)),
            None => {
                let record = UserRecord::new(username, phone.clone(), token);
                tables.by_phone.insert(phone.clone(), record);
                None
            }
        };

        if let Some(old) = previous {
            tables.by_token.remove(&old);
        }
        tables.by_token.insert(token, phone.clone());

        debug!(%phone, %token, "Upserted registration");
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        username: &str,
        phone: &PhoneNumber,
        token: DToken,
    ) -> Result<Registration, StorageError> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.by_phone.get(phone) {
            return Ok(Registration::Existing(existing.d_token));
        }
        if tables.by_token.contains_key(&token) {
            return Err(StorageError::TokenConflict(token));
        }

        tables
            .by_phone
            .insert(phone.clone(), UserRecord::new(username, phone.clone(), token));
        tables.by_token.insert(token, phone.clone());

        Ok(Registration::Created(token))
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.tables.read().await.by_phone.len())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
