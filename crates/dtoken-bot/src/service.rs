//! Service loop: receive, gate, dispatch and reply.

use crate::dispatcher::Dispatcher;
use signal_client::{BotMessage, SignalClient};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

/// Runs the bot over a stream of inbound messages.
///
/// The rate limit is applied in arrival order on the receive loop. Handling
/// and replying run on spawned tasks, at most `max_concurrent` at a time.
/// On shutdown, in-flight messages get up to `shutdown_timeout` to finish.
pub struct Service {
    dispatcher: Arc<Dispatcher>,
    signal: SignalClient,
    max_concurrent: usize,
    shutdown_timeout: Duration,
}

impl Service {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        signal: SignalClient,
        max_concurrent: usize,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            signal,
            max_concurrent: max_concurrent.max(1),
            shutdown_timeout,
        }
    }

    /// Process `messages` until the stream ends or `shutdown` completes.
    pub async fn run<S, F>(&self, messages: S, shutdown: F)
    where
        S: Stream<Item = BotMessage>,
        F: Future<Output = ()>,
    {
        tokio::pin!(messages);
        tokio::pin!(shutdown);

        let in_flight = Arc::new(Semaphore::new(self.max_concurrent));

        loop {
            tokio::select! {
                next = messages.next() => {
                    let Some(message) = next else {
                        info!("Message stream ended");
                        break;
                    };
                    let Ok(permit) = Arc::clone(&in_flight).acquire_owned().await else {
                        break;
                    };

                    let admitted = self.dispatcher.admit(&message, Instant::now()).await;
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let signal = self.signal.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Some(reply) = dispatcher.respond(&message, admitted).await {
                            if let Err(e) = signal.reply(&message, &reply).await {
                                error!("Failed to send reply: {}", e);
                            }
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.drain(&in_flight).await;
    }

    /// Wait until every permit is back, i.e. no message task is running.
    async fn drain(&self, in_flight: &Semaphore) {
        let running = self.max_concurrent - in_flight.available_permits();
        if running == 0 {
            return;
        }

        info!("Waiting for {} in-flight messages", running);
        let all_permits = u32::try_from(self.max_concurrent).unwrap_or(u32::MAX);
        let drained =
            tokio::time::timeout(self.shutdown_timeout, in_flight.acquire_many(all_permits))
                .await;
        match drained {
            Ok(_) => info!("In-flight messages finished"),
            Err(_) => warn!(
                "Shutdown timeout elapsed, abandoning {} in-flight messages",
                self.max_concurrent - in_flight.available_permits()
            ),
        }
    }
}
