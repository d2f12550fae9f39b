use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reclaim_core::models::{LineItem, WarrantyLookupResult, WarrantyLookupStatus, WarrantyUpsert};
use reclaim_core::{AppError, AuditEvent, AuditEventType, AuditSink, Clock};
use reclaim_db::{LineItemRepository, ReceiptRepository, WarrantyRepository};
use serde::Serialize;
use uuid::Uuid;

use super::resolver::{normalize_confidence, ResolverOutcome, WarrantyQuery, WarrantyResolver};

/// Found/not-found results younger than this are served without a lookup.
pub const CACHE_TTL_DAYS: i64 = 30;

/// A claim older than this is treated as abandoned and may be taken over.
pub const CLAIM_STALE_AFTER_MINUTES: i64 = 5;

const MISSING_PURCHASE_DATE: &str =
    "Receipt has no purchase date; set one before checking warranty";

#[derive(Debug, Clone, Copy)]
pub struct WarrantyCheckRequest {
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub receipt_id: Uuid,
    pub item_id: Uuid,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarrantyCheckOutcome {
    pub item: LineItem,
    pub cached: bool,
    pub warranty_found: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum WarrantyError {
    #[error("Receipt {0} not found")]
    ReceiptNotFound(Uuid),

    #[error("Line item {0} not found")]
    ItemNotFound(Uuid),

    #[error("{}", MISSING_PURCHASE_DATE)]
    MissingPurchaseDate,

    #[error("Warranty lookup already in progress for item {0}")]
    LookupInProgress(Uuid),

    #[error("Warranty store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl From<WarrantyError> for AppError {
    fn from(err: WarrantyError) -> Self {
        match err {
            WarrantyError::ReceiptNotFound(id) => AppError::NotFound(format!("Receipt {}", id)),
            WarrantyError::ItemNotFound(id) => AppError::NotFound(format!("Line item {}", id)),
            WarrantyError::MissingPurchaseDate => {
                AppError::PreconditionFailed(MISSING_PURCHASE_DATE.to_string())
            }
            WarrantyError::LookupInProgress(id) => AppError::LookupInProgress(format!(
                "Warranty lookup already in progress for item {}",
                id
            )),
            WarrantyError::Store(e) => AppError::InternalWithSource {
                message: "Warranty check failed".to_string(),
                source: e,
            },
        }
    }
}

/// Resolves warranty coverage for one line item at a time.
pub struct WarrantyEngine {
    receipts: Arc<dyn ReceiptRepository>,
    items: Arc<dyn LineItemRepository>,
    warranties: Arc<dyn WarrantyRepository>,
    resolvers: Vec<Arc<dyn WarrantyResolver>>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl WarrantyEngine {
    pub fn new(
        receipts: Arc<dyn ReceiptRepository>,
        items: Arc<dyn LineItemRepository>,
        warranties: Arc<dyn WarrantyRepository>,
        resolvers: Vec<Arc<dyn WarrantyResolver>>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            receipts,
            items,
            warranties,
            resolvers,
            audit,
            clock,
        }
    }

    fn is_fresh(item: &LineItem, now: DateTime<Utc>) -> bool {
        item.warranty_lookup_status.is_cacheable()
            && item
                .warranty_checked_at
                .map(|checked| now - checked < Duration::days(CACHE_TTL_DAYS))
                .unwrap_or(false)
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            tenant_id = %request.tenant_id,
            receipt_id = %request.receipt_id,
            item_id = %request.item_id,
            force = request.force
        )
    )]
    pub async fn check(
        &self,
        request: WarrantyCheckRequest,
    ) -> Result<WarrantyCheckOutcome, WarrantyError> {
        let WarrantyCheckRequest {
            tenant_id,
            actor_id,
            receipt_id,
            item_id,
            force,
        } = request;

        let receipt = self
            .receipts
            .get_receipt(tenant_id, receipt_id)
            .await
            .map_err(WarrantyError::Store)?
            .ok_or(WarrantyError::ReceiptNotFound(receipt_id))?;

        let item = self
            .items
            .get_line_item(tenant_id, receipt_id, item_id)
            .await
            .map_err(WarrantyError::Store)?
            .ok_or(WarrantyError::ItemNotFound(item_id))?;

        let Some(purchase_date) = receipt.purchase_date else {
            let now = self.clock.now();
            // A live lookup owns the row; recording the error needs the claim too.
            self.claim(tenant_id, receipt_id, item_id, now).await?;
            self.items
                .record_warranty_result(
                    tenant_id,
                    receipt_id,
                    item_id,
                    &WarrantyLookupResult::error(MISSING_PURCHASE_DATE, now),
                )
                .await
                .map_err(WarrantyError::Store)?;
            self.audit_failure(&request, item.warranty_lookup_status, MISSING_PURCHASE_DATE, now);
            tracing::info!(item_id = %item_id, "Warranty check refused, no purchase date");
            return Err(WarrantyError::MissingPurchaseDate);
        };

        let now = self.clock.now();
        if !force && Self::is_fresh(&item, now) {
            tracing::debug!(
                item_id = %item_id,
                status = %item.warranty_lookup_status,
                "Serving cached warranty result"
            );
            let warranty_found = item.warranty_lookup_status == WarrantyLookupStatus::Found;
            return Ok(WarrantyCheckOutcome {
                item,
                cached: true,
                warranty_found,
            });
        }

        let previous_status = item.warranty_lookup_status;
        let claimed = self.claim(tenant_id, receipt_id, item_id, now).await?;

        let query = WarrantyQuery::new(&receipt, &claimed, purchase_date);
        let start = std::time::Instant::now();
        let mut first_error: Option<String> = None;
        let mut matched = None;

        for resolver in &self.resolvers {
            match resolver.resolve(&query).await {
                ResolverOutcome::Matched(warranty) => {
                    tracing::debug!(resolver = resolver.name(), "Warranty resolver matched");
                    matched = Some(warranty);
                    break;
                }
                ResolverOutcome::NoMatch { reason } => {
                    tracing::debug!(resolver = resolver.name(), reason = %reason, "No warranty match");
                }
                ResolverOutcome::Error(message) => {
                    tracing::warn!(resolver = resolver.name(), error = %message, "Warranty resolver failed");
                    first_error.get_or_insert(message);
                }
            }
        }

        let now = self.clock.now();
        let outcome = match matched {
            Some(warranty) => {
                let confidence = normalize_confidence(warranty.confidence);
                self.warranties
                    .upsert_warranty(
                        WarrantyUpsert {
                            tenant_id,
                            receipt_id,
                            line_item_id: item_id,
                            start_date: warranty.start_date,
                            end_date: warranty.end_date,
                            category: warranty.category,
                            manufacturer: warranty.manufacturer,
                            confidence,
                            source: warranty.source,
                            source_urls: warranty.source_urls,
                        },
                        now,
                    )
                    .await
                    .map_err(WarrantyError::Store)?;

                let item = self
                    .items
                    .record_warranty_result(
                        tenant_id,
                        receipt_id,
                        item_id,
                        &WarrantyLookupResult::found(
                            warranty.end_date,
                            confidence,
                            warranty.source,
                            now,
                        ),
                    )
                    .await
                    .map_err(WarrantyError::Store)?;

                self.audit.record(
                    AuditEvent::new(tenant_id, "line_item", item_id, AuditEventType::WarrantyResolved, now)
                        .with_actor(actor_id)
                        .with_before(serde_json::json!({ "status": previous_status }))
                        .with_after(serde_json::json!({
                            "status": item.warranty_lookup_status,
                            "end_date": item.warranty_end_date,
                            "source": item.warranty_source,
                            "confidence": item.warranty_confidence,
                        })),
                );

                WarrantyCheckOutcome {
                    item,
                    cached: false,
                    warranty_found: true,
                }
            }
            None => {
                let result = match first_error {
                    Some(ref message) => WarrantyLookupResult::error(message.clone(), now),
                    None => WarrantyLookupResult::not_found(now),
                };
                let item = self
                    .items
                    .record_warranty_result(tenant_id, receipt_id, item_id, &result)
                    .await
                    .map_err(WarrantyError::Store)?;

                if let Some(ref message) = first_error {
                    self.audit_failure(&request, previous_status, message, now);
                }

                WarrantyCheckOutcome {
                    item,
                    cached: false,
                    warranty_found: false,
                }
            }
        };

        tracing::info!(
            item_id = %item_id,
            status = %outcome.item.warranty_lookup_status,
            source = ?outcome.item.warranty_source,
            duration_ms = start.elapsed().as_millis() as u64,
            "Warranty check completed"
        );

        Ok(outcome)
    }

    async fn claim(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LineItem, WarrantyError> {
        self.items
            .claim_warranty_lookup(
                tenant_id,
                receipt_id,
                item_id,
                now,
                now - Duration::minutes(CLAIM_STALE_AFTER_MINUTES),
            )
            .await
            .map_err(WarrantyError::Store)?
            .ok_or(WarrantyError::LookupInProgress(item_id))
    }

    fn audit_failure(
        &self,
        request: &WarrantyCheckRequest,
        previous_status: WarrantyLookupStatus,
        message: &str,
        now: DateTime<Utc>,
    ) {
        self.audit.record(
            AuditEvent::new(
                request.tenant_id,
                "line_item",
                request.item_id,
                AuditEventType::WarrantyLookupFailed,
                now,
            )
            .with_actor(request.actor_id)
            .with_before(serde_json::json!({ "status": previous_status }))
            .with_after(serde_json::json!({
                "status": WarrantyLookupStatus::Error,
                "error": message,
            })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        extracted_receipt, sample_line_item, InMemoryLineItemRepository,
        InMemoryReceiptRepository, InMemoryWarrantyRepository, RecordingAuditSink,
        StubAiProvider,
    };
    use crate::warranty::{AiWarrantyAnswer, AiWarrantyResolver, HeuristicWarrantyResolver};
    use chrono::{NaiveDate, TimeZone};
    use reclaim_core::models::{ReceiptRecord, WarrantySource};
    use reclaim_core::ManualClock;
    use reclaim_infra::InMemoryRateLimiter;
    use rust_decimal::Decimal;

    struct Harness {
        receipts: Arc<InMemoryReceiptRepository>,
        items: Arc<InMemoryLineItemRepository>,
        warranties: Arc<InMemoryWarrantyRepository>,
        audit: Arc<RecordingAuditSink>,
        clock: Arc<ManualClock>,
        provider: Arc<StubAiProvider>,
        engine: WarrantyEngine,
    }

    fn harness(provider: StubAiProvider) -> Harness {
        let receipts = Arc::new(InMemoryReceiptRepository::new());
        let items = Arc::new(InMemoryLineItemRepository::new());
        let warranties = Arc::new(InMemoryWarrantyRepository::new());
        let audit = Arc::new(RecordingAuditSink::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap(),
        ));
        let provider = Arc::new(provider);
        let limiter = Arc::new(InMemoryRateLimiter::new(clock.clone()));

        let resolvers: Vec<Arc<dyn WarrantyResolver>> = vec![
            Arc::new(AiWarrantyResolver::new(provider.clone(), limiter, 60)),
            Arc::new(HeuristicWarrantyResolver::new().unwrap()),
        ];
        let engine = WarrantyEngine::new(
            receipts.clone(),
            items.clone(),
            warranties.clone(),
            resolvers,
            audit.clone(),
            clock.clone(),
        );

        Harness {
            receipts,
            items,
            warranties,
            audit,
            clock,
            provider,
            engine,
        }
    }

    fn purchase_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    fn no_warranty() -> AiWarrantyAnswer {
        AiWarrantyAnswer {
            has_warranty: false,
            ..AiWarrantyAnswer::default()
        }
    }

    impl Harness {
        fn seed(&self, merchant: &str, item_name: &str, price: Option<Decimal>) -> (ReceiptRecord, LineItem) {
            let tenant = Uuid::new_v4();
            let receipt = extracted_receipt(tenant, merchant, purchase_date());
            let item = sample_line_item(&receipt, item_name, price);
            self.receipts.insert(receipt.clone());
            self.items.insert(item.clone());
            (receipt, item)
        }

        fn request(&self, item: &LineItem, force: bool) -> WarrantyCheckRequest {
            WarrantyCheckRequest {
                tenant_id: item.tenant_id,
                actor_id: Some(Uuid::new_v4()),
                receipt_id: item.receipt_id,
                item_id: item.id,
                force,
            }
        }
    }

    #[tokio::test]
    async fn test_drill_falls_back_to_heuristic_when_ai_is_down() {
        let h = harness(StubAiProvider::failing("connection refused"));
        let (receipt, item) = h.seed("Home Depot", "Cordless Drill", Some(Decimal::new(12999, 2)));

        let outcome = h.engine.check(h.request(&item, false)).await.unwrap();

        assert!(outcome.warranty_found);
        assert!(!outcome.cached);
        assert_eq!(outcome.item.warranty_lookup_status, WarrantyLookupStatus::Found);
        assert_eq!(outcome.item.warranty_source, Some(WarrantySource::Receipt));
        assert!(outcome.item.warranty_checked_at.is_some());
        assert!(outcome.item.warranty_error.is_none());
        assert_eq!(h.provider.calls(), 1);

        let record = h.warranties.get(item.tenant_id, receipt.id, item.id).unwrap();
        assert_eq!(record.start_date, purchase_date());
        assert_eq!(record.end_date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert_eq!(record.source, WarrantySource::Receipt);
        assert_eq!(h.audit.event_types(), vec![AuditEventType::WarrantyResolved]);
    }

    #[tokio::test]
    async fn test_latte_is_not_found_without_record() {
        let h = harness(StubAiProvider::answering(no_warranty()));
        let (_, item) = h.seed("Starbucks", "Latte", Some(Decimal::new(550, 2)));

        let outcome = h.engine.check(h.request(&item, false)).await.unwrap();

        assert!(!outcome.warranty_found);
        assert_eq!(outcome.item.warranty_lookup_status, WarrantyLookupStatus::NotFound);
        assert!(outcome.item.warranty_end_date.is_none());
        assert_eq!(h.warranties.count(), 0);
        assert!(h.audit.events().is_empty());
    }

    #[tokio::test]
    async fn test_ai_match_is_recorded_as_ai_lookup() {
        let h = harness(StubAiProvider::answering(AiWarrantyAnswer {
            has_warranty: true,
            duration_months: Some(serde_json::json!(36)),
            manufacturer: Some("DeWalt".to_string()),
            category: Some("tools".to_string()),
            confidence: Some(serde_json::json!(0.9)),
            source_urls: vec!["https://www.dewalt.com/warranty".to_string()],
        }));
        let (receipt, item) = h.seed("Home Depot", "Cordless Drill", None);

        let outcome = h.engine.check(h.request(&item, false)).await.unwrap();

        assert_eq!(outcome.item.warranty_source, Some(WarrantySource::AiLookup));
        assert_eq!(outcome.item.warranty_confidence, Some(0.9));
        assert_eq!(
            outcome.item.warranty_end_date,
            NaiveDate::from_ymd_opt(2028, 1, 10)
        );
        let record = h.warranties.get(item.tenant_id, receipt.id, item.id).unwrap();
        assert_eq!(record.manufacturer.as_deref(), Some("DeWalt"));
        assert_eq!(record.source_urls.len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_stored_as_null() {
        let h = harness(StubAiProvider::answering(AiWarrantyAnswer {
            has_warranty: true,
            duration_months: Some(serde_json::json!(12)),
            confidence: Some(serde_json::json!(1.7)),
            ..AiWarrantyAnswer::default()
        }));
        let (receipt, item) = h.seed("Best Buy", "OLED TV", None);

        let outcome = h.engine.check(h.request(&item, false)).await.unwrap();

        assert!(outcome.warranty_found);
        assert_eq!(outcome.item.warranty_confidence, None);
        let record = h.warranties.get(item.tenant_id, receipt.id, item.id).unwrap();
        assert_eq!(record.confidence, None);
    }

    #[tokio::test]
    async fn test_fresh_result_is_served_from_cache() {
        let h = harness(StubAiProvider::answering(no_warranty()));
        let (_, item) = h.seed("Home Depot", "Cordless Drill", None);

        h.engine.check(h.request(&item, false)).await.unwrap();
        assert_eq!(h.provider.calls(), 1);

        h.clock.advance(Duration::days(29));
        let outcome = h.engine.check(h.request(&item, false)).await.unwrap();
        assert!(outcome.cached);
        assert!(outcome.warranty_found);
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_checks_again() {
        let h = harness(StubAiProvider::answering(no_warranty()));
        let (_, item) = h.seed("Starbucks", "Latte", None);

        h.engine.check(h.request(&item, false)).await.unwrap();
        h.clock.advance(Duration::days(CACHE_TTL_DAYS));

        let outcome = h.engine.check(h.request(&item, false)).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(h.provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let h = harness(StubAiProvider::answering(no_warranty()));
        let (_, item) = h.seed("Home Depot", "Cordless Drill", None);

        h.engine.check(h.request(&item, false)).await.unwrap();
        let outcome = h.engine.check(h.request(&item, true)).await.unwrap();

        assert!(!outcome.cached);
        assert_eq!(h.provider.calls(), 2);
        // The upsert keeps a single record per item.
        assert_eq!(h.warranties.count(), 1);
    }

    #[tokio::test]
    async fn test_error_status_is_not_cached() {
        let h = harness(StubAiProvider::failing("upstream 529"));
        let (_, item) = h.seed("Starbucks", "Latte", None);

        let first = h.engine.check(h.request(&item, false)).await.unwrap();
        assert_eq!(first.item.warranty_lookup_status, WarrantyLookupStatus::Error);
        assert!(first
            .item
            .warranty_error
            .as_deref()
            .unwrap()
            .contains("upstream 529"));
        assert_eq!(h.audit.event_types(), vec![AuditEventType::WarrantyLookupFailed]);

        let second = h.engine.check(h.request(&item, false)).await.unwrap();
        assert!(!second.cached);
        assert_eq!(h.provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_purchase_date_fails_without_lookup() {
        let h = harness(StubAiProvider::answering(no_warranty()));
        let (mut receipt, item) = h.seed("Home Depot", "Cordless Drill", None);
        receipt.purchase_date = None;
        h.receipts.insert(receipt);

        let err = h.engine.check(h.request(&item, false)).await.unwrap_err();

        assert!(matches!(err, WarrantyError::MissingPurchaseDate));
        assert_eq!(h.provider.calls(), 0);
        let stored = h.items.get(item.tenant_id, item.id).unwrap();
        assert_eq!(stored.warranty_lookup_status, WarrantyLookupStatus::Error);
        assert!(stored.warranty_error.is_some());
        assert_eq!(h.audit.event_types(), vec![AuditEventType::WarrantyLookupFailed]);
    }

    #[tokio::test]
    async fn test_missing_purchase_date_leaves_live_claim_alone() {
        let h = harness(StubAiProvider::answering(no_warranty()));
        let (mut receipt, item) = h.seed("Home Depot", "Cordless Drill", None);
        let started = h.clock.now() - Duration::seconds(30);
        h.items
            .claim_warranty_lookup(item.tenant_id, item.receipt_id, item.id, started, started)
            .await
            .unwrap()
            .unwrap();
        receipt.purchase_date = None;
        h.receipts.insert(receipt);

        let err = h.engine.check(h.request(&item, false)).await.unwrap_err();

        assert!(matches!(err, WarrantyError::LookupInProgress(id) if id == item.id));
        let stored = h.items.get(item.tenant_id, item.id).unwrap();
        assert_eq!(stored.warranty_lookup_status, WarrantyLookupStatus::InProgress);
        assert_eq!(stored.warranty_lookup_started_at, Some(started));
        assert!(stored.warranty_error.is_none());
        assert!(h.audit.event_types().is_empty());
    }

    #[tokio::test]
    async fn test_live_claim_rejects_concurrent_check() {
        let h = harness(StubAiProvider::answering(no_warranty()));
        let (_, item) = h.seed("Home Depot", "Cordless Drill", None);
        let now = h.clock.now();
        h.items
            .claim_warranty_lookup(item.tenant_id, item.receipt_id, item.id, now, now)
            .await
            .unwrap()
            .unwrap();

        let err = h.engine.check(h.request(&item, false)).await.unwrap_err();
        assert!(matches!(err, WarrantyError::LookupInProgress(id) if id == item.id));
        assert_eq!(h.provider.calls(), 0);

        h.clock.advance(Duration::minutes(CLAIM_STALE_AFTER_MINUTES + 1));
        let outcome = h.engine.check(h.request(&item, false)).await.unwrap();
        assert!(outcome.warranty_found);
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_check_item() {
        let h = harness(StubAiProvider::answering(no_warranty()));
        let (_, item) = h.seed("Home Depot", "Cordless Drill", None);

        let mut request = h.request(&item, false);
        request.tenant_id = Uuid::new_v4();

        let err = h.engine.check(request).await.unwrap_err();
        assert!(matches!(err, WarrantyError::ReceiptNotFound(_)));
    }

    #[test]
    fn test_errors_map_to_app_errors() {
        assert!(matches!(
            AppError::from(WarrantyError::MissingPurchaseDate),
            AppError::PreconditionFailed(_)
        ));
        assert!(matches!(
            AppError::from(WarrantyError::LookupInProgress(Uuid::new_v4())),
            AppError::LookupInProgress(_)
        ));
        assert!(matches!(
            AppError::from(WarrantyError::ItemNotFound(Uuid::new_v4())),
            AppError::NotFound(_)
        ));
    }
}
