use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reclaim_core::models::WarrantySource;
use reclaim_core::RateLimiter;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::resolver::{
    add_months, normalize_confidence, ResolvedWarranty, ResolverOutcome, WarrantyQuery,
    WarrantyResolver,
};

/// Longest duration accepted from a provider (50 years).
const MAX_DURATION_MONTHS: f64 = 600.0;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(3600);

/// Structured answer expected from the AI provider.
///
/// Numeric fields are kept as raw JSON so a malformed value drops that field
/// instead of failing the whole answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiWarrantyAnswer {
    #[serde(default)]
    pub has_warranty: bool,
    #[serde(default)]
    pub duration_months: Option<JsonValue>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub confidence: Option<JsonValue>,
    #[serde(default)]
    pub source_urls: Vec<String>,
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl AiWarrantyAnswer {
    /// Positive whole-month duration, if the answer carries one.
    pub fn months(&self) -> Option<u32> {
        self.duration_months
            .as_ref()
            .and_then(as_number)
            .filter(|m| m.is_finite() && *m >= 1.0 && *m <= MAX_DURATION_MONTHS)
            .map(|m| m.round() as u32)
    }

    pub fn confidence(&self) -> Option<f64> {
        normalize_confidence(self.confidence.as_ref().and_then(as_number))
    }
}

/// Provider that answers a warranty question for one item.
#[async_trait]
pub trait WarrantyAiProvider: Send + Sync {
    async fn lookup(&self, query: &WarrantyQuery) -> Result<AiWarrantyAnswer>;
}

/// Tier 1: ask an AI provider, rate limited per tenant.
pub struct AiWarrantyResolver {
    provider: Arc<dyn WarrantyAiProvider>,
    limiter: Arc<dyn RateLimiter>,
    limit_per_hour: u32,
}

impl AiWarrantyResolver {
    pub fn new(
        provider: Arc<dyn WarrantyAiProvider>,
        limiter: Arc<dyn RateLimiter>,
        limit_per_hour: u32,
    ) -> Self {
        Self {
            provider,
            limiter,
            limit_per_hour,
        }
    }
}

#[async_trait]
impl WarrantyResolver for AiWarrantyResolver {
    fn name(&self) -> &'static str {
        "ai_lookup"
    }

    async fn resolve(&self, query: &WarrantyQuery) -> ResolverOutcome {
        let key = format!("warranty_ai:{}", query.tenant_id);
        match self
            .limiter
            .check_and_increment(&key, self.limit_per_hour, RATE_LIMIT_WINDOW)
            .await
        {
            Ok(decision) if !decision.allowed => {
                tracing::info!(
                    tenant_id = %query.tenant_id,
                    reset_at = %decision.reset_at,
                    "AI warranty lookup rate limited"
                );
                return ResolverOutcome::no_match("AI lookup rate limit reached");
            }
            Ok(_) => {}
            Err(e) => {
                // Fail open: the limiter only protects cost.
                tracing::warn!(error = %e, "Rate limiter unavailable, allowing AI lookup");
            }
        }

        let start = std::time::Instant::now();
        let answer = match self.provider.lookup(query).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(
                    item_id = %query.item_id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "AI warranty lookup failed"
                );
                return ResolverOutcome::Error(format!("AI lookup failed: {}", e));
            }
        };

        tracing::debug!(
            item_id = %query.item_id,
            has_warranty = answer.has_warranty,
            duration_ms = start.elapsed().as_millis() as u64,
            "AI warranty lookup answered"
        );

        let months = match answer.months() {
            Some(months) if answer.has_warranty => months,
            _ => return ResolverOutcome::no_match("AI lookup reported no warranty"),
        };

        let Some(end_date) = add_months(query.purchase_date, months) else {
            return ResolverOutcome::no_match("AI warranty duration out of range");
        };

        ResolverOutcome::Matched(ResolvedWarranty {
            start_date: query.purchase_date,
            end_date,
            category: answer.category.clone(),
            manufacturer: answer.manufacturer.clone(),
            confidence: answer.confidence(),
            source: WarrantySource::AiLookup,
            source_urls: answer
                .source_urls
                .iter()
                .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
                .cloned()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAiProvider;
    use chrono::{NaiveDate, TimeZone, Utc};
    use reclaim_core::{ManualClock, RateLimitDecision};
    use reclaim_infra::InMemoryRateLimiter;
    use uuid::Uuid;

    struct FixedLimiter {
        allowed: bool,
    }

    #[async_trait]
    impl RateLimiter for FixedLimiter {
        async fn check_and_increment(
            &self,
            _key: &str,
            limit: u32,
            _window: Duration,
        ) -> Result<RateLimitDecision> {
            Ok(RateLimitDecision {
                allowed: self.allowed,
                remaining: if self.allowed { limit } else { 0 },
                reset_at: Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap(),
            })
        }
    }

    fn query() -> WarrantyQuery {
        WarrantyQuery {
            tenant_id: Uuid::new_v4(),
            receipt_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            item_name: "OLED TV 55in".to_string(),
            description: None,
            merchant: Some("Best Buy".to_string()),
            purchase_date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            price: None,
        }
    }

    fn resolver(provider: Arc<StubAiProvider>, allowed: bool) -> AiWarrantyResolver {
        AiWarrantyResolver::new(provider, Arc::new(FixedLimiter { allowed }), 60)
    }

    #[tokio::test]
    async fn test_positive_answer_matches() {
        let provider = Arc::new(StubAiProvider::answering(AiWarrantyAnswer {
            has_warranty: true,
            duration_months: Some(serde_json::json!(24)),
            manufacturer: Some("LG".to_string()),
            category: Some("electronics".to_string()),
            confidence: Some(serde_json::json!(0.85)),
            source_urls: vec![
                "https://www.lg.com/warranty".to_string(),
                "javascript:alert(1)".to_string(),
            ],
        }));

        match resolver(provider, true).resolve(&query()).await {
            ResolverOutcome::Matched(w) => {
                assert_eq!(w.start_date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
                assert_eq!(w.end_date, NaiveDate::from_ymd_opt(2026, 5, 10).unwrap());
                assert_eq!(w.source, WarrantySource::AiLookup);
                assert_eq!(w.confidence, Some(0.85));
                assert_eq!(w.manufacturer.as_deref(), Some("LG"));
                assert_eq!(w.source_urls, vec!["https://www.lg.com/warranty".to_string()]);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_dropped() {
        let provider = Arc::new(StubAiProvider::answering(AiWarrantyAnswer {
            has_warranty: true,
            duration_months: Some(serde_json::json!("12")),
            confidence: Some(serde_json::json!(85)),
            ..AiWarrantyAnswer::default()
        }));

        match resolver(provider, true).resolve(&query()).await {
            ResolverOutcome::Matched(w) => {
                assert_eq!(w.end_date, NaiveDate::from_ymd_opt(2025, 5, 10).unwrap());
                assert_eq!(w.confidence, None);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_duration_is_no_match() {
        let provider = Arc::new(StubAiProvider::answering(AiWarrantyAnswer {
            has_warranty: true,
            duration_months: Some(serde_json::json!(0)),
            ..AiWarrantyAnswer::default()
        }));
        assert!(matches!(
            resolver(provider, true).resolve(&query()).await,
            ResolverOutcome::NoMatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_is_error() {
        let provider = Arc::new(StubAiProvider::failing("connection reset"));
        match resolver(provider, true).resolve(&query()).await {
            ResolverOutcome::Error(msg) => assert!(msg.contains("connection reset")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_skips_provider() {
        let provider = Arc::new(StubAiProvider::failing("should not be called"));
        let outcome = resolver(provider.clone(), false).resolve(&query()).await;
        assert!(matches!(outcome, ResolverOutcome::NoMatch { .. }));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_tenant_limit_applies_per_hour() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
        ));
        let limiter = Arc::new(InMemoryRateLimiter::new(clock.clone()));
        let provider = Arc::new(StubAiProvider::answering(AiWarrantyAnswer::default()));
        let resolver = AiWarrantyResolver::new(provider.clone(), limiter, 2);
        let q = query();

        for _ in 0..3 {
            resolver.resolve(&q).await;
        }
        assert_eq!(provider.calls(), 2);

        clock.advance(chrono::Duration::hours(1));
        resolver.resolve(&q).await;
        assert_eq!(provider.calls(), 3);
    }
}
