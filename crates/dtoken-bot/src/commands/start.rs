//! Start command - asks for a phone number.

use crate::commands::{CommandHandler, START_PROMPT};
use crate::error::AppResult;
use async_trait::async_trait;
use signal_client::BotMessage;
use tracing::debug;

pub struct StartHandler;

impl StartHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StartHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler for StartHandler {
    fn name(&self) -> &str {
        "start"
    }

    fn triggers(&self) -> &[&str] {
        &["!start", "/start"]
    }

    async fn execute(&self, message: &BotMessage) -> AppResult<String> {
        debug!(user = %message.display_name(), "Start command");
        Ok(START_PROMPT.into())
    }
}
