//! Extraction dispatch
//!
//! Hands a `pending` receipt to the external extraction worker and waits only
//! for the worker to accept it. When the handoff fails the receipt is forced
//! into `in_review` so a human sees it instead of it sitting in `pending`.
//!
//! Dispatch is at-least-once: the reaper may send the same receipt again, and
//! the worker ignores receipts that already left `pending`.

mod http_worker;

pub use http_worker::HttpExtractionWorker;

use std::sync::Arc;

use async_trait::async_trait;
use reclaim_core::models::{EmailProvenance, ReceiptRecord};
use reclaim_core::{AuditEvent, AuditEventType, AuditSink, Clock};
use reclaim_db::ReceiptRepository;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body sent to the extraction worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionPayload {
    pub record_id: Uuid,
    pub owner_id: Uuid,
    pub storage_key: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_provenance: Option<EmailProvenance>,
}

impl ExtractionPayload {
    pub fn for_receipt(record: &ReceiptRecord) -> Self {
        Self {
            record_id: record.id,
            owner_id: record.owner_id,
            storage_key: record.storage_key.clone(),
            content_type: record.content_type.clone(),
            email_provenance: record.provenance().filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Extraction worker unreachable: {0}")]
    Unreachable(String),

    #[error("Extraction worker timed out")]
    Timeout,

    #[error("Extraction worker rejected receipt: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to move receipt to review: {0}")]
    Store(#[source] anyhow::Error),
}

/// Something that can accept an extraction job.
#[async_trait]
pub trait ExtractionWorker: Send + Sync {
    /// Submit the job and return once the worker has accepted it.
    async fn submit(&self, payload: &ExtractionPayload) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The worker accepted the job; the receipt stays `pending` until it reports back.
    Accepted,
    /// The handoff failed and the receipt was moved to review. `record` is the
    /// updated row, or `None` if the receipt had already left `pending`.
    FellBackToReview {
        reason: String,
        record: Option<ReceiptRecord>,
    },
}

impl DispatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DispatchOutcome::Accepted)
    }
}

#[derive(Clone)]
pub struct ExtractionDispatcher {
    worker: Arc<dyn ExtractionWorker>,
    receipts: Arc<dyn ReceiptRepository>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl ExtractionDispatcher {
    pub fn new(
        worker: Arc<dyn ExtractionWorker>,
        receipts: Arc<dyn ReceiptRepository>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            worker,
            receipts,
            audit,
            clock,
        }
    }

    /// Hand `record` to the worker.
    ///
    /// Only a failure to write the review fallback is returned as an error; a
    /// worker failure is reported as [`DispatchOutcome::FellBackToReview`].
    #[tracing::instrument(skip(self, record), fields(receipt_id = %record.id, tenant_id = %record.tenant_id))]
    pub async fn dispatch(&self, record: &ReceiptRecord) -> Result<DispatchOutcome, DispatchError> {
        let payload = ExtractionPayload::for_receipt(record);
        let start = std::time::Instant::now();

        let reason = match self.worker.submit(&payload).await {
            Ok(()) => {
                tracing::info!(
                    receipt_id = %record.id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Extraction worker accepted receipt"
                );
                return Ok(DispatchOutcome::Accepted);
            }
            Err(e) => e.to_string(),
        };

        tracing::warn!(
            receipt_id = %record.id,
            error = %reason,
            duration_ms = start.elapsed().as_millis() as u64,
            "Extraction handoff failed, moving receipt to review"
        );

        let updated = self
            .receipts
            .mark_needs_review(record.tenant_id, record.id, self.clock.now())
            .await
            .map_err(DispatchError::Store)?;

        match updated {
            Some(ref after) => {
                self.audit.record(
                    AuditEvent::new(
                        record.tenant_id,
                        "receipt",
                        record.id,
                        AuditEventType::ReceiptDispatchFailed,
                        self.clock.now(),
                    )
                    .with_actor(Some(record.owner_id))
                    .with_before(serde_json::json!({
                        "status": record.status,
                        "needs_review": record.needs_review,
                        "confidence_score": record.confidence_score,
                    }))
                    .with_after(serde_json::json!({
                        "status": after.status,
                        "needs_review": after.needs_review,
                        "confidence_score": after.confidence_score,
                        "reason": reason,
                    })),
                );
            }
            None => {
                tracing::info!(
                    receipt_id = %record.id,
                    "Receipt already left pending, review fallback skipped"
                );
            }
        }

        Ok(DispatchOutcome::FellBackToReview {
            reason,
            record: updated,
        })
    }
}
