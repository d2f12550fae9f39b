//! Counter/limiter abstraction with a check-and-increment contract per key and
//! fixed window. Backed in-process (`reclaim-infra`) for single instances or by
//! Postgres (`reclaim-db`) when several instances share limits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one hit against `key` in the current window and report whether it
    /// stayed within `limit`.
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, anyhow::Error>;
}

/// Start of the fixed window containing `now`.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window_secs = window.as_secs().max(1) as i64;
    let ts = now.timestamp();
    let start = ts - ts.rem_euclid(window_secs);
    DateTime::<Utc>::from_timestamp(start, 0).unwrap_or(now)
}
