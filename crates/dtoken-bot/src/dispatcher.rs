//! Per-message turn handling: rate limiting, routing and error replies.

use crate::commands::{
    CommandHandler, RegisterHandler, StartHandler, RATE_LIMITED_REPLY, TRY_AGAIN_REPLY,
};
use crate::rate_limit::RateLimiter;
use registration_store::{RegistrationStore, TokenGenerator};
use signal_client::BotMessage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Routes each inbound message to a command handler and produces its reply.
///
/// Every message, commands included, passes the rate limiter first. Handler
/// failures become a generic "try again later" reply so that one failing
/// message never stops the service loop.
pub struct Dispatcher {
    handlers: Vec<Box<dyn CommandHandler>>,
    rate_limiter: Arc<RateLimiter>,
}

impl Dispatcher {
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            handlers: Vec::new(),
            rate_limiter,
        }
    }

    /// Standard registration bot: `!start` plus phone number submissions.
    pub fn registration(
        store: Arc<dyn RegistrationStore>,
        tokens: TokenGenerator,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self::new(rate_limiter)
            .with_handler(StartHandler::new())
            .with_handler(RegisterHandler::new(store, tokens))
    }

    /// Append a handler. Earlier handlers win when several match.
    pub fn with_handler(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn dispatch(&self, message: &BotMessage) -> Option<String> {
        self.dispatch_at(message, Instant::now()).await
    }

    /// Handle one message as if it arrived at `now`.
    ///
    /// Returns `None` when no handler matches.
    pub async fn dispatch_at(&self, message: &BotMessage, now: Instant) -> Option<String> {
        let admitted = self.admit(message, now).await;
        self.respond(message, admitted).await
    }

    /// Apply the rate limit to `message` arriving at `now`.
    ///
    /// Call in arrival order; only [`Dispatcher::respond`] may run out of order.
    pub async fn admit(&self, message: &BotMessage, now: Instant) -> bool {
        let admitted = self.rate_limiter.check_and_mark(message.user_id(), now).await;
        if !admitted {
            warn!(user_id = %message.user_id(), "Rate limit triggered");
        }
        admitted
    }

    /// Produce the reply for a message already passed through [`Dispatcher::admit`].
    pub async fn respond(&self, message: &BotMessage, admitted: bool) -> Option<String> {
        if !admitted {
            return Some(RATE_LIMITED_REPLY.into());
        }

        let handler = self.handlers.iter().find(|h| h.matches(message))?;
        debug!(handler = handler.name(), user_id = %message.user_id(), "Dispatching message");

        match handler.execute(message).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!(
                    handler = handler.name(),
                    user_id = %message.user_id(),
                    "Handler error: {}",
                    e
                );
                Some(TRY_AGAIN_REPLY.into())
            }
        }
    }
}
