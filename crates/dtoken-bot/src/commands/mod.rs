//! Bot command handlers.

mod register;
mod start;

pub use register::RegisterHandler;
pub use start::StartHandler;

use crate::error::AppResult;
use async_trait::async_trait;
use registration_store::DToken;
use signal_client::BotMessage;

pub const START_PROMPT: &str = "Hi! Please enter your 10-digit phone number:";
pub const INVALID_PHONE_REPLY: &str = "Please enter a valid 10-digit phone number.";
pub const RATE_LIMITED_REPLY: &str = "You're sending messages too quickly. Please slow down.";
pub const TRY_AGAIN_REPLY: &str = "Sorry, something went wrong. Please try again later.";

pub fn new_token_reply(token: DToken) -> String {
    format!("Your D-Token is: {token}")
}

pub fn already_registered_reply(token: DToken) -> String {
    format!("It is already registered. Your existing D-Token is: {token}")
}

/// Command handler trait.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Command name used in logs (e.g., "start").
    fn name(&self) -> &str;

    /// Words that invoke this command (e.g., "!start").
    fn triggers(&self) -> &[&str] {
        &[]
    }

    /// Whether this handler takes messages no trigger claimed.
    fn is_default(&self) -> bool {
        false
    }

    /// Check if this handler matches the message.
    ///
    /// Triggers are compared against the first word of the message.
    fn matches(&self, message: &BotMessage) -> bool {
        let triggers = self.triggers();
        if triggers.is_empty() {
            return self.is_default();
        }

        message
            .text
            .split_whitespace()
            .next()
            .is_some_and(|word| triggers.iter().any(|t| word.eq_ignore_ascii_case(t)))
    }

    /// Execute the command.
    async fn execute(&self, message: &BotMessage) -> AppResult<String>;
}
