//! D-Token issuance.

use crate::error::TokenError;
use crate::store::RegistrationStore;
use crate::types::DToken;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of uniformly random candidates tried before probing.
pub const DEFAULT_MAX_RANDOM_ATTEMPTS: u32 = 16;

/// Default number of sequential candidates probed after random drawing fails.
pub const DEFAULT_MAX_SEQUENTIAL_PROBES: u64 = 10_000;

/// Issues D-Tokens not yet present in the store.
///
/// Candidates are drawn uniformly from the 10-digit range. When
/// `max_random_attempts` draws all collide, the generator walks upward from
/// the last candidate (wrapping at the top of the range) for at most
/// `max_sequential_probes` values before giving up.
///
/// Issuance only reads the store. Nothing is reserved, so the caller must
/// still handle [`StorageError::TokenConflict`](crate::StorageError::TokenConflict)
/// when writing the token.
#[derive(Clone)]
pub struct TokenGenerator {
    store: Arc<dyn RegistrationStore>,
    max_random_attempts: u32,
    max_sequential_probes: u64,
}

impl TokenGenerator {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            store,
            max_random_attempts: DEFAULT_MAX_RANDOM_ATTEMPTS,
            max_sequential_probes: DEFAULT_MAX_SEQUENTIAL_PROBES,
        }
    }

    pub fn with_limits(mut self, max_random_attempts: u32, max_sequential_probes: u64) -> Self {
        self.max_random_attempts = max_random_attempts;
        self.max_sequential_probes = max_sequential_probes;
        self
    }

    /// Issue a token unused at the time of the check.
    pub async fn issue_token(&self) -> Result<DToken, TokenError> {
        let mut candidate = random_token();

        for attempt in 1..=self.max_random_attempts {
            if attempt > 1 {
                candidate = random_token();
            }
            if !self.store.token_exists(candidate).await? {
                return Ok(candidate);
            }
            debug!(attempt, "D-Token collision, redrawing");
        }

        if self.max_random_attempts > 0 {
            warn!(
                attempts = self.max_random_attempts,
                "Random D-Token draws exhausted, probing sequentially"
            );
        }

        for _ in 0..self.max_sequential_probes {
            candidate = candidate.next_wrapping();
            if !self.store.token_exists(candidate).await? {
                return Ok(candidate);
            }
        }

        Err(TokenError::Exhausted {
            attempts: u64::from(self.max_random_attempts) + self.max_sequential_probes,
        })
    }
}

fn random_token() -> DToken {
    DToken::from_raw(rand::thread_rng().gen_range(DToken::MIN..=DToken::MAX))
}
