//! Storage trait shared by every registration backend.

use crate::error::StorageError;
use crate::types::{DToken, PhoneNumber, Registration, UserRecord};
use async_trait::async_trait;

/// Persistent mapping of phone numbers to D-Tokens.
///
/// Both `phone_number` and `d_token` are unique across all records.
/// Every method commits on its own; there is no transaction spanning calls.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Exact-match lookup of the token assigned to a phone number.
    async fn find_token_by_phone(&self, phone: &PhoneNumber)
        -> Result<Option<DToken>, StorageError>;

    /// Full record for a phone number.
    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<Option<UserRecord>, StorageError>;

    /// Whether any record holds this token.
    async fn token_exists(&self, token: DToken) -> Result<bool, StorageError>;

    /// Insert a record, or overwrite the token of the record with the same phone.
    ///
    /// Fails with [`StorageError::TokenConflict`] if the token belongs to a
    /// different phone number.
    async fn upsert(
        &self,
        username: &str,
        phone: &PhoneNumber,
        token: DToken,
    ) -> Result<(), StorageError>;

    /// Insert a record unless one already exists for the phone.
    ///
    /// Atomic: of several concurrent callers for one phone, exactly one gets
    /// [`Registration::Created`] and the rest see its token as
    /// [`Registration::Existing`].
    async fn insert_if_absent(
        &self,
        username: &str,
        phone: &PhoneNumber,
        token: DToken,
    ) -> Result<Registration, StorageError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StorageError>;

    async fn health_check(&self) -> bool {
        self.count().await.is_ok()
    }
}
