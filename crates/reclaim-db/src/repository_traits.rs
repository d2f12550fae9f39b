//! Repository trait abstractions
//!
//! The minimal store interface the pipeline services need. Every method is
//! tenant-scoped except the reaper's cross-tenant sweep (`list_stale_pending`).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reclaim_core::models::{
    LineItem, NewReceipt, ReceiptRecord, WarrantyLookupResult, WarrantyRecord, WarrantyUpsert,
};
use reclaim_core::ContentFingerprint;
use uuid::Uuid;

/// Result of inserting a receipt row.
#[derive(Debug, Clone)]
pub enum CreateReceiptOutcome {
    Created(ReceiptRecord),
    /// The (tenant, fingerprint) unique index rejected the insert: another
    /// upload of the same bytes won the race.
    FingerprintTaken,
}

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    async fn create_receipt(&self, receipt: NewReceipt) -> Result<CreateReceiptOutcome>;

    async fn get_receipt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>>;

    /// Most recent receipt with this fingerprint, scoped to the tenant.
    async fn find_by_fingerprint(
        &self,
        tenant_id: Uuid,
        fingerprint: &ContentFingerprint,
    ) -> Result<Option<ReceiptRecord>>;

    /// Force a still-`pending` receipt into `in_review` with `needs_review = true`
    /// and a zero confidence score. Returns `None` when the receipt has already
    /// left `pending` (or does not exist).
    async fn mark_needs_review(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ReceiptRecord>>;

    /// Pending receipts created before `created_before`, oldest first.
    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReceiptRecord>>;

    async fn count_created_since(&self, tenant_id: Uuid, since: DateTime<Utc>) -> Result<i64>;

    /// Delete the receipt row (line items and warranty records cascade) and
    /// return it so the caller can release the stored file.
    async fn delete_receipt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>>;
}

#[async_trait]
pub trait LineItemRepository: Send + Sync {
    async fn get_line_item(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<LineItem>>;

    /// Compare-and-swap the item into `in_progress`. Succeeds when the item is
    /// not already `in_progress`, or when the existing claim started before
    /// `stale_before`. Returns `None` when another lookup holds the claim.
    async fn claim_warranty_lookup(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<LineItem>>;

    /// Write the terminal lookup fields and release the claim.
    async fn record_warranty_result(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
        result: &WarrantyLookupResult,
    ) -> Result<LineItem>;
}

#[async_trait]
pub trait WarrantyRepository: Send + Sync {
    /// Update the record for (tenant, receipt, item) if one exists, else insert.
    async fn upsert_warranty(
        &self,
        warranty: WarrantyUpsert,
        now: DateTime<Utc>,
    ) -> Result<WarrantyRecord>;
}
