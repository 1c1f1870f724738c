//! D-Token registration bot.
//!
//! Users send a 10-digit phone number over Signal and receive the unique
//! D-Token registered for it. Messages are rate limited per sender, and a
//! phone number keeps its first token on every later submission.

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod rate_limit;
pub mod service;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{AppError, AppResult};
pub use rate_limit::RateLimiter;
pub use service::Service;
