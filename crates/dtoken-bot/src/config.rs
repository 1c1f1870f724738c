//! Application configuration loaded from environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Signal configuration
    pub signal: SignalConfig,

    /// Registration storage configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// D-Token issuance configuration
    #[serde(default)]
    pub token: TokenConfig,

    /// Bot configuration
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// Signal CLI REST API endpoint
    #[serde(default = "default_signal_service")]
    pub service_url: String,

    /// The bot's registered Signal number
    pub phone_number: String,

    /// Poll interval for messages
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Enable persistence (if false, registrations are in-memory only)
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Number of pooled database connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Upper bound for a single store operation
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum time between processed messages from one user
    #[serde(default = "default_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,

    /// Idle time after which a user's entry is forgotten
    #[serde(default = "default_idle_ttl", with = "humantime_serde")]
    pub idle_ttl: Duration,

    /// How often idle entries are swept
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Random candidates tried before sequential probing
    #[serde(default = "default_max_random_attempts")]
    pub max_random_attempts: u32,

    /// Sequential candidates probed before giving up
    #[serde(default = "default_max_sequential_probes")]
    pub max_sequential_probes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Messages handled concurrently
    #[serde(default = "default_max_concurrent_messages")]
    pub max_concurrent_messages: usize,

    /// Grace period for in-flight messages on shutdown
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default implementations
impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            persist: default_true(),
            pool_size: default_pool_size(),
            operation_timeout: default_operation_timeout(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            idle_ttl: default_idle_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            max_random_attempts: default_max_random_attempts(),
            max_sequential_probes: default_max_sequential_probes(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_concurrent_messages: default_max_concurrent_messages(),
            shutdown_timeout: default_shutdown_timeout(),
            log_level: default_log_level(),
        }
    }
}

// Default value functions
fn default_signal_service() -> String {
    "http://signal-api:8080".into()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/data/dtoken.db")
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> usize {
    5
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_cooldown() -> Duration {
    Duration::from_secs(5)
}

fn default_idle_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_random_attempts() -> u32 {
    registration_store::DEFAULT_MAX_RANDOM_ATTEMPTS
}

fn default_max_sequential_probes() -> u64 {
    registration_store::DEFAULT_MAX_SEQUENTIAL_PROBES
}

fn default_max_concurrent_messages() -> usize {
    32
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_environment(config::Environment::default())
    }

    /// Build configuration from an environment source.
    pub fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                environment
                    .separator("__")
                    // Note: try_parsing(true) would parse +16504928286 as a positive number
                    // stripping the + prefix. Keep strings as strings.
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::default().source(Some(map))
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_environment(env(&[("SIGNAL__PHONE_NUMBER", "+15555555555")]))
            .unwrap();

        assert_eq!(config.signal.phone_number, "+15555555555");
        assert_eq!(config.signal.service_url, "http://signal-api:8080");
        assert_eq!(config.store.pool_size, 5);
        assert!(config.store.persist);
        assert_eq!(config.rate_limit.cooldown, Duration::from_secs(5));
        assert_eq!(config.token.max_random_attempts, 16);
        assert_eq!(config.bot.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.bot.log_level, "info");
    }

    #[test]
    fn test_overrides_parsed() {
        let config = Config::from_environment(env(&[
            ("SIGNAL__PHONE_NUMBER", "+15555555555"),
            ("STORE__PATH", "/tmp/registrations.db"),
            ("STORE__PERSIST", "false"),
            ("STORE__POOL_SIZE", "2"),
            ("RATE_LIMIT__COOLDOWN", "10s"),
            ("RATE_LIMIT__IDLE_TTL", "1h"),
            ("TOKEN__MAX_SEQUENTIAL_PROBES", "50"),
            ("BOT__SHUTDOWN_TIMEOUT", "30s"),
        ]))
        .unwrap();

        assert_eq!(config.store.path, PathBuf::from("/tmp/registrations.db"));
        assert!(!config.store.persist);
        assert_eq!(config.store.pool_size, 2);
        assert_eq!(config.rate_limit.cooldown, Duration::from_secs(10));
        assert_eq!(config.rate_limit.idle_ttl, Duration::from_secs(3600));
        assert_eq!(config.token.max_sequential_probes, 50);
        assert_eq!(config.bot.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_bot_number_is_error() {
        assert!(Config::from_environment(env(&[])).is_err());
    }
}
