//! Postgres-backed fixed-window counters shared by every API instance.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use reclaim_core::rate_limit::window_start;
use reclaim_core::{Clock, RateLimitDecision, RateLimiter};

#[derive(Clone)]
pub struct PgRateLimiter {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgRateLimiter {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Drop counters whose window started before `before`.
    #[tracing::instrument(skip(self), fields(db.table = "rate_limit_counters", db.operation = "delete"))]
    pub async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE window_start < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .context("Failed to delete expired rate limit counters")?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RateLimiter for PgRateLimiter {
    #[tracing::instrument(skip(self), fields(db.table = "rate_limit_counters", db.operation = "upsert"))]
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let start = window_start(self.clock.now(), window);
        let window_secs = window.as_secs().max(1) as i64;
        let reset_at = start + chrono::Duration::seconds(window_secs);

        let count: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_counters (key, window_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (key, window_start)
            DO UPDATE SET count = rate_limit_counters.count + 1
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(start)
        .fetch_one(&self.pool)
        .await
        .context("Failed to increment rate limit counter")?;

        let count = count.max(0) as u32;
        let allowed = count <= limit;

        if !allowed {
            tracing::debug!(key = %key, count = count, limit = limit, "Rate limit exceeded");
        }

        Ok(RateLimitDecision {
            allowed,
            remaining: limit.saturating_sub(count),
            reset_at,
        })
    }
}
