//! D-Token Registration Bot - Main entry point.

use anyhow::Context;
use dtoken_bot::{AppResult, Config, Dispatcher, RateLimiter, Service};
use registration_store::{
    MemoryStore, PoolOptions, RegistrationStore, SqliteStore, TokenGenerator,
};
use signal_client::{MessageReceiver, SignalClient};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.bot.log_level);

    info!("Starting D-Token Registration Bot...");

    // Initialize storage
    let store: Arc<dyn RegistrationStore> = if config.store.persist {
        let options = PoolOptions {
            pool_size: config.store.pool_size,
            operation_timeout: config.store.operation_timeout,
        };
        Arc::new(SqliteStore::open(&config.store.path, options).await?)
    } else {
        info!("Persistence disabled, using in-memory storage");
        Arc::new(MemoryStore::new())
    };

    if !store.health_check().await {
        error!("Registration store not answering");
        return Err(anyhow::anyhow!("Registration store not answering").into());
    }
    match store.count().await {
        Ok(count) => info!("Registration store ready with {} records", count),
        Err(e) => warn!("Could not count registrations: {}", e),
    }

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit.cooldown,
        config.rate_limit.idle_ttl,
    ));
    let _sweeper = rate_limiter.spawn_sweeper(config.rate_limit.sweep_interval);

    let tokens = TokenGenerator::new(store.clone()).with_limits(
        config.token.max_random_attempts,
        config.token.max_sequential_probes,
    );

    let dispatcher = Arc::new(Dispatcher::registration(store, tokens, rate_limiter));
    info!("Registered {} command handlers", dispatcher.handler_count());

    let signal = SignalClient::new(&config.signal.service_url, &config.signal.phone_number)
        .context("Failed to create Signal client")?;

    if !signal.health_check().await {
        error!("Signal API not reachable at {}", config.signal.service_url);
        return Err(anyhow::anyhow!("Signal API not reachable").into());
    }
    info!("Signal API healthy");
    info!("Listening for messages...");

    // Start message receiver
    let receiver = MessageReceiver::new(signal.clone(), config.signal.poll_interval);
    let service = Service::new(
        dispatcher,
        signal,
        config.bot.max_concurrent_messages,
        config.bot.shutdown_timeout,
    );

    // Main message loop
    service
        .run(receiver.stream(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Shutting down...");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
