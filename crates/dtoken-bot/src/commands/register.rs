//! Registration - validates a phone number and issues its D-Token.

use crate::commands::{
    already_registered_reply, new_token_reply, CommandHandler, INVALID_PHONE_REPLY,
};
use crate::error::AppResult;
use async_trait::async_trait;
use registration_store::{
    PhoneNumber, Registration, RegistrationStore, StorageError, TokenGenerator,
};
use signal_client::BotMessage;
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts at writing a fresh token before a conflict is reported as an error.
const MAX_INSERT_ATTEMPTS: u32 = 3;

/// Default handler: every message that is not a command is treated as a
/// phone number submission.
pub struct RegisterHandler {
    store: Arc<dyn RegistrationStore>,
    tokens: TokenGenerator,
}

impl RegisterHandler {
    pub fn new(store: Arc<dyn RegistrationStore>, tokens: TokenGenerator) -> Self {
        Self { store, tokens }
    }

    /// Issue a token and store it unless someone registered the phone first.
    ///
    /// A fresh token can still collide with one written concurrently for a
    /// different phone; such conflicts are retried with a new token.
    async fn register_new(&self, username: &str, phone: &PhoneNumber) -> AppResult<Registration> {
        let mut attempt = 1;
        loop {
            let token = self.tokens.issue_token().await?;

            match self.store.insert_if_absent(username, phone, token).await {
                Err(StorageError::TokenConflict(taken)) if attempt < MAX_INSERT_ATTEMPTS => {
                    warn!(%taken, attempt, "D-Token taken between check and insert, reissuing");
                    attempt += 1;
                }
                result => return Ok(result?),
            }
        }
    }
}

#[async_trait]
impl CommandHandler for RegisterHandler {
    fn name(&self) -> &str {
        "register"
    }

    fn is_default(&self) -> bool {
        true
    }

    async fn execute(&self, message: &BotMessage) -> AppResult<String> {
        let username = message.display_name();

        let phone = match PhoneNumber::parse(&message.text) {
            Ok(phone) => phone,
            Err(invalid) => {
                warn!(user = %username, input = %invalid.0, "Invalid phone number input");
                return Ok(INVALID_PHONE_REPLY.into());
            }
        };

        if let Some(existing) = self.store.find_token_by_phone(&phone).await? {
            info!(
                user = %username,
                %phone,
                "Attempted to register an existing phone number"
            );
            return Ok(already_registered_reply(existing));
        }

        match self.register_new(username, &phone).await? {
            Registration::Created(token) => {
                info!(user = %username, %phone, d_token = %token, "New registration");
                Ok(new_token_reply(token))
            }
            Registration::Existing(token) => {
                info!(
                    user = %username,
                    %phone,
                    "Phone number registered concurrently, returning first token"
                );
                Ok(already_registered_reply(token))
            }
        }
    }
}
