//! Per-user cooldown rate limiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shortest period accepted for the background sweep.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Tracks when each user last had a message processed.
///
/// A message is allowed when the user is new or the cooldown has elapsed
/// since their last allowed message. Blocked messages do not extend the
/// cooldown. Entries idle for longer than `idle_ttl` are dropped by
/// [`RateLimiter::sweep`].
pub struct RateLimiter {
    last_seen: Mutex<HashMap<String, Instant>>,
    cooldown: Duration,
    idle_ttl: Duration,
}

impl RateLimiter {
    /// Create a limiter. `idle_ttl` is raised to `cooldown` if shorter.
    pub fn new(cooldown: Duration, idle_ttl: Duration) -> Self {
        Self {
            last_seen: Mutex::new(HashMap::new()),
            cooldown,
            idle_ttl: idle_ttl.max(cooldown),
        }
    }

    /// Check whether `user_id` may proceed at `now`, recording the time if so.
    pub async fn check_and_mark(&self, user_id: &str, now: Instant) -> bool {
        let mut last_seen = self.last_seen.lock().await;

        if let Some(previous) = last_seen.get(user_id) {
            if now.saturating_duration_since(*previous) < self.cooldown {
                return false;
            }
        }

        last_seen.insert(user_id.to_string(), now);
        true
    }

    /// Drop entries idle for longer than the TTL. Returns how many were removed.
    pub async fn sweep(&self, now: Instant) -> usize {
        let mut last_seen = self.last_seen.lock().await;
        let before = last_seen.len();

        last_seen.retain(|_, seen| now.saturating_duration_since(*seen) <= self.idle_ttl);

        before - last_seen.len()
    }

    /// Number of users currently tracked.
    pub async fn tracked_users(&self) -> usize {
        self.last_seen.lock().await.len()
    }

    /// Spawn a background task sweeping idle entries every `interval`,
    /// raised to [`MIN_SWEEP_INTERVAL`] if shorter.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = limiter.sweep(Instant::now()).await;
                if removed > 0 {
                    debug!("Swept {} idle rate-limit entries", removed);
                }
            }
        })
    }
}
