//! In-process fixed-window rate limiter.
//!
//! Counters live in this process only, so limits are per instance. Deployments
//! running several API instances use the Postgres limiter instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reclaim_core::rate_limit::window_start;
use reclaim_core::{Clock, RateLimitDecision, RateLimiter};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct WindowBucket {
    window_start: DateTime<Utc>,
    reset_at: DateTime<Utc>,
    count: u32,
}

impl WindowBucket {
    fn check_and_increment(
        &mut self,
        limit: u32,
        start: DateTime<Utc>,
        reset_at: DateTime<Utc>,
    ) -> (bool, u32) {
        if self.window_start != start {
            self.window_start = start;
            self.reset_at = reset_at;
            self.count = 0;
        }

        if self.count < limit {
            self.count += 1;
            (true, limit.saturating_sub(self.count))
        } else {
            (false, 0)
        }
    }
}

/// Sharded limiter: keys hash to one of several independently locked maps to
/// keep lock contention low.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    shards: Vec<Arc<Mutex<HashMap<String, WindowBucket>>>>,
    shard_count: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateLimiter {
    /// Create a limiter with the default shard count (16 shards)
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_shards(clock, 16)
    }

    pub fn with_shards(clock: Arc<dyn Clock>, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            shard_count,
            clock,
        }
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shard_count
    }

    /// Drop buckets whose window has ended. Returns how many were removed.
    pub async fn cleanup_expired_buckets(&self) -> usize {
        let now = self.clock.now();
        let mut total_cleaned = 0;

        for shard in &self.shards {
            let mut buckets = shard.lock().await;
            let before_count = buckets.len();
            buckets.retain(|_key, bucket| bucket.reset_at > now);
            total_cleaned += before_count - buckets.len();
        }

        if total_cleaned > 0 {
            tracing::debug!(
                buckets_cleaned = total_cleaned,
                "Cleaned up expired rate limit buckets"
            );
        }

        total_cleaned
    }

    /// Run `cleanup_expired_buckets` on a fixed interval for the life of the process.
    pub fn start_cleanup(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.cleanup_expired_buckets().await;
            }
        })
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, anyhow::Error> {
        let start = window_start(self.clock.now(), window);
        let reset_at = start + chrono::Duration::seconds(window.as_secs().max(1) as i64);

        let shard = &self.shards[self.shard_index(key)];
        let mut buckets = shard.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| WindowBucket {
                window_start: start,
                reset_at,
                count: 0,
            });

        let (allowed, remaining) = bucket.check_and_increment(limit, start, reset_at);

        if !allowed {
            tracing::debug!(key = %key, limit = limit, "Rate limit exceeded");
        }

        Ok(RateLimitDecision {
            allowed,
            remaining,
            reset_at: bucket.reset_at,
        })
    }
}
