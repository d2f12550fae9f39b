//! Receipt ingest gateway
//!
//! Pipeline: size → format (by signature) → quota → fingerprint/duplicate →
//! store blob → create `pending` record → dispatch.
//!
//! The duplicate check runs before the storage write, and the record is only
//! created once the blob is stored. If record creation fails the blob is
//! deleted again so no orphan is left behind.

mod error;
pub mod signature;

pub use error::IngestError;
pub use signature::ReceiptFormat;

use std::sync::Arc;

use reclaim_core::models::{EmailProvenance, NewReceipt, ReceiptSummary};
use reclaim_core::{AuditEvent, AuditEventType, AuditSink, Clock, Config, ContentFingerprint, QuotaGate};
use reclaim_db::{CreateReceiptOutcome, ReceiptRepository};
use reclaim_storage::Storage;
use uuid::Uuid;

use crate::dispatch::{DispatchOutcome, ExtractionDispatcher};
use crate::duplicate::DuplicateDetector;

/// Validation limits applied to every upload.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub max_size_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_size_bytes: config.max_receipt_size_bytes() as u64,
            allowed_content_types: config
                .allowed_content_types()
                .iter()
                .map(|ct| signature::normalize_mime_type(ct))
                .collect(),
        }
    }
}

/// One file to ingest, with the caller's tenant context.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
    pub data: Vec<u8>,
    pub declared_content_type: Option<String>,
    pub original_filename: Option<String>,
    pub email_provenance: Option<EmailProvenance>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub receipt: ReceiptSummary,
    pub dispatch: Option<DispatchOutcome>,
}

pub struct IngestGateway {
    receipts: Arc<dyn ReceiptRepository>,
    storage: Arc<dyn Storage>,
    duplicates: DuplicateDetector,
    quota: Arc<dyn QuotaGate>,
    dispatcher: Arc<ExtractionDispatcher>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    settings: IngestSettings,
}

impl IngestGateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        receipts: Arc<dyn ReceiptRepository>,
        storage: Arc<dyn Storage>,
        quota: Arc<dyn QuotaGate>,
        dispatcher: Arc<ExtractionDispatcher>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            duplicates: DuplicateDetector::new(receipts.clone()),
            receipts,
            storage,
            quota,
            dispatcher,
            audit,
            clock,
            settings,
        }
    }

    /// Accept one receipt file.
    ///
    /// Errors are only returned for failures that happen before a record
    /// exists. Once the record is created a failed handoff is absorbed by the
    /// dispatcher's review fallback and reflected in the returned status.
    #[tracing::instrument(
        skip(self, request),
        fields(tenant_id = %request.tenant_id, size_bytes = request.data.len())
    )]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        let IngestRequest {
            tenant_id,
            actor_id,
            data,
            declared_content_type,
            original_filename,
            email_provenance,
        } = request;

        // 1. Validate size and format
        let format = self.validate(&data, declared_content_type.as_deref())?;

        // 2. Plan limits
        let decision = self
            .quota
            .check_upload(tenant_id)
            .await
            .map_err(IngestError::Internal)?;
        if !decision.allowed {
            tracing::warn!(
                tenant_id = %tenant_id,
                used = decision.used,
                limit = decision.limit,
                "Receipt upload rejected by plan limit"
            );
            return Err(IngestError::PlanLimitReached {
                used: decision.used,
                limit: decision.limit,
            });
        }

        // 3. Duplicate check, before anything is written
        let fingerprint = ContentFingerprint::of(&data);
        if let Some(existing) = self
            .duplicates
            .find_existing(tenant_id, &fingerprint)
            .await
            .map_err(IngestError::Internal)?
        {
            self.audit_duplicate(tenant_id, actor_id, &existing.id);
            return Err(IngestError::duplicate_of(&existing));
        }

        // 4. Store the blob
        let receipt_id = Uuid::new_v4();
        let filename = format!("{}.{}", receipt_id, format.extension());
        let file_size = data.len() as i64;

        let (storage_key, _storage_url) = self
            .storage
            .upload(tenant_id, &filename, format.content_type(), data)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, receipt_id = %receipt_id, "Failed to upload receipt to storage");
                IngestError::StorageFailed(e)
            })?;

        // 5. Create the pending record
        let new_receipt = NewReceipt {
            id: receipt_id,
            tenant_id,
            owner_id: actor_id,
            content_fingerprint: fingerprint.clone(),
            storage_key: storage_key.clone(),
            content_type: format.content_type().to_string(),
            file_size,
            original_filename: original_filename.map(|f| sanitize_filename(&f)),
            email_provenance: email_provenance.filter(|p| !p.is_empty()),
            created_at: self.clock.now(),
        };

        let record = match self.receipts.create_receipt(new_receipt).await {
            Ok(CreateReceiptOutcome::Created(record)) => record,
            Ok(CreateReceiptOutcome::FingerprintTaken) => {
                self.release_blob(&storage_key).await;
                return Err(self
                    .resolve_fingerprint_race(tenant_id, actor_id, &fingerprint)
                    .await);
            }
            Err(e) => {
                tracing::error!(error = %e, receipt_id = %receipt_id, "Failed to create receipt record");
                self.release_blob(&storage_key).await;
                return Err(IngestError::Internal(e));
            }
        };

        tracing::info!(
            receipt_id = %record.id,
            tenant_id = %tenant_id,
            storage_key = %record.storage_key,
            content_type = %record.content_type,
            file_size = record.file_size,
            "Receipt ingested"
        );

        self.audit.record(
            AuditEvent::new(
                tenant_id,
                "receipt",
                record.id,
                AuditEventType::ReceiptUploaded,
                self.clock.now(),
            )
            .with_actor(Some(actor_id))
            .with_after(serde_json::json!({
                "status": record.status,
                "content_type": record.content_type,
                "file_size": record.file_size,
                "content_fingerprint": record.content_fingerprint,
            })),
        );

        // 6. Hand off to extraction
        let mut summary = record.summary();
        let dispatch = match self.dispatcher.dispatch(&record).await {
            Ok(outcome) => {
                if let DispatchOutcome::FellBackToReview {
                    record: Some(ref updated),
                    ..
                } = outcome
                {
                    summary.status = updated.status;
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    receipt_id = %record.id,
                    "Dispatch failed; receipt left pending for the reaper"
                );
                None
            }
        };

        Ok(IngestOutcome {
            receipt: summary,
            dispatch,
        })
    }

    fn validate(
        &self,
        data: &[u8],
        declared_content_type: Option<&str>,
    ) -> Result<ReceiptFormat, IngestError> {
        let size = data.len() as u64;
        if size > self.settings.max_size_bytes {
            return Err(IngestError::TooLarge {
                size,
                limit: self.settings.max_size_bytes,
            });
        }

        if data.is_empty() {
            return Err(IngestError::UnsupportedType(
                "Uploaded file is empty".to_string(),
            ));
        }

        let format = ReceiptFormat::sniff(data).ok_or_else(|| {
            IngestError::UnsupportedType(
                "File content is not a JPEG, PNG, WebP, HEIC or PDF document".to_string(),
            )
        })?;

        if let Some(declared) = declared_content_type.filter(|ct| !signature::is_generic_label(ct))
        {
            if ReceiptFormat::from_content_type(declared) != Some(format) {
                return Err(IngestError::UnsupportedType(format!(
                    "Declared content type {} does not match file content ({})",
                    signature::normalize_mime_type(declared),
                    format.content_type()
                )));
            }
        }

        if !self
            .settings
            .allowed_content_types
            .iter()
            .any(|ct| ct == format.content_type())
        {
            return Err(IngestError::UnsupportedType(format!(
                "Content type {} is not allowed. Allowed types: {}",
                format.content_type(),
                self.settings.allowed_content_types.join(", ")
            )));
        }

        Ok(format)
    }

    /// The unique index rejected our insert: another upload of the same bytes
    /// committed between the duplicate check and the insert.
    async fn resolve_fingerprint_race(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        fingerprint: &ContentFingerprint,
    ) -> IngestError {
        match self.duplicates.find_existing(tenant_id, fingerprint).await {
            Ok(Some(existing)) => {
                self.audit_duplicate(tenant_id, actor_id, &existing.id);
                IngestError::duplicate_of(&existing)
            }
            Ok(None) => IngestError::Conflict(
                "Receipt fingerprint was claimed by a concurrent upload".to_string(),
            ),
            Err(e) => IngestError::Internal(e),
        }
    }

    fn audit_duplicate(&self, tenant_id: Uuid, actor_id: Uuid, existing_id: &Uuid) {
        tracing::info!(
            tenant_id = %tenant_id,
            existing_id = %existing_id,
            "Duplicate receipt upload rejected"
        );
        self.audit.record(
            AuditEvent::new(
                tenant_id,
                "receipt",
                *existing_id,
                AuditEventType::ReceiptDuplicateRejected,
                self.clock.now(),
            )
            .with_actor(Some(actor_id)),
        );
    }

    async fn release_blob(&self, storage_key: &str) {
        if let Err(e) = self.storage.delete(storage_key).await {
            tracing::error!(
                error = %e,
                storage_key = %storage_key,
                "Failed to delete stored receipt after record creation failed"
            );
        }
    }
}

/// Keep only the final path component and replace unusual characters.
fn sanitize_filename(filename: &str) -> String {
    const MAX_FILENAME_LENGTH: usize = 255;

    let filename_only = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim().is_empty() || sanitized.contains("..") {
        return "receipt".to_string();
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        jpeg_bytes, pdf_bytes, InMemoryReceiptRepository, InMemoryStorage, RecordingAuditSink,
        StubQuota, StubWorker,
    };
    use reclaim_core::models::ReceiptStatus;
    use reclaim_core::{ErrorMetadata, ManualClock};

    struct Harness {
        gateway: IngestGateway,
        repo: Arc<InMemoryReceiptRepository>,
        storage: Arc<InMemoryStorage>,
        worker: Arc<StubWorker>,
        audit: Arc<RecordingAuditSink>,
    }

    fn harness_with(worker: StubWorker, quota: StubQuota) -> Harness {
        let repo = Arc::new(InMemoryReceiptRepository::new());
        let storage = Arc::new(InMemoryStorage::new());
        let worker = Arc::new(worker);
        let audit = Arc::new(RecordingAuditSink::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let dispatcher = Arc::new(ExtractionDispatcher::new(
            worker.clone(),
            repo.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let gateway = IngestGateway::new(
            repo.clone(),
            storage.clone(),
            Arc::new(quota),
            dispatcher,
            audit.clone(),
            clock,
            IngestSettings {
                max_size_bytes: 10 * 1024 * 1024,
                allowed_content_types: vec![
                    "image/jpeg".to_string(),
                    "image/png".to_string(),
                    "application/pdf".to_string(),
                ],
            },
        );
        Harness {
            gateway,
            repo,
            storage,
            worker,
            audit,
        }
    }

    fn harness() -> Harness {
        harness_with(StubWorker::accepting(), StubQuota::unlimited())
    }

    fn request(tenant_id: Uuid, data: Vec<u8>, content_type: &str) -> IngestRequest {
        IngestRequest {
            tenant_id,
            actor_id: Uuid::new_v4(),
            data,
            declared_content_type: Some(content_type.to_string()),
            original_filename: Some("receipt.jpg".to_string()),
            email_provenance: None,
        }
    }

    #[tokio::test]
    async fn test_ingest_creates_pending_record_and_dispatches() {
        let h = harness();
        let tenant_id = Uuid::new_v4();

        let outcome = h
            .gateway
            .ingest(request(tenant_id, jpeg_bytes(3 * 1024 * 1024), "image/jpeg"))
            .await
            .unwrap();

        assert_eq!(outcome.receipt.status, ReceiptStatus::Pending);
        assert!(outcome.dispatch.unwrap().is_accepted());

        let stored = h.repo.get(tenant_id, outcome.receipt.id).unwrap();
        assert_eq!(stored.content_type, "image/jpeg");
        assert_eq!(stored.file_size, 3 * 1024 * 1024);
        assert!(stored
            .storage_key
            .ends_with(&format!("{}.jpg", outcome.receipt.id)));
        assert!(h.storage.has_file(&stored.storage_key));
        assert_eq!(h.worker.submissions().len(), 1);
        assert_eq!(
            h.audit.event_types(),
            vec![AuditEventType::ReceiptUploaded]
        );
    }

    #[tokio::test]
    async fn test_unreachable_worker_leaves_receipt_in_review() {
        let h = harness_with(StubWorker::unreachable(), StubQuota::unlimited());
        let tenant_id = Uuid::new_v4();

        let outcome = h
            .gateway
            .ingest(request(tenant_id, jpeg_bytes(3 * 1024 * 1024), "image/jpeg"))
            .await
            .unwrap();

        assert_eq!(outcome.receipt.status, ReceiptStatus::InReview);
        let stored = h.repo.get(tenant_id, outcome.receipt.id).unwrap();
        assert_eq!(stored.status, ReceiptStatus::InReview);
        assert!(stored.needs_review);
        assert_eq!(stored.confidence_score, Some(0.0));
        assert_eq!(
            h.audit.event_types(),
            vec![
                AuditEventType::ReceiptUploaded,
                AuditEventType::ReceiptDispatchFailed
            ]
        );
    }

    #[tokio::test]
    async fn test_same_bytes_same_tenant_rejected_as_duplicate() {
        let h = harness();
        let tenant_id = Uuid::new_v4();
        let bytes = jpeg_bytes(3 * 1024 * 1024);

        let first = h
            .gateway
            .ingest(request(tenant_id, bytes.clone(), "image/jpeg"))
            .await
            .unwrap();
        let err = h
            .gateway
            .ingest(request(tenant_id, bytes, "image/jpeg"))
            .await
            .unwrap_err();

        match err {
            IngestError::Duplicate {
                existing_id,
                existing_status,
                existing_created_at,
            } => {
                assert_eq!(existing_id, first.receipt.id);
                assert_eq!(existing_status, ReceiptStatus::Pending);
                assert_eq!(existing_created_at, first.receipt.created_at);
            }
            other => panic!("expected duplicate, got {:?}", other),
        }

        assert_eq!(h.repo.count(), 1);
        assert_eq!(h.storage.file_count(), 1);
        assert_eq!(h.worker.submissions().len(), 1);
        assert!(h
            .audit
            .event_types()
            .contains(&AuditEventType::ReceiptDuplicateRejected));
    }

    #[tokio::test]
    async fn test_same_bytes_different_tenants_both_succeed() {
        let h = harness();
        let bytes = pdf_bytes();

        let a = h
            .gateway
            .ingest(request(Uuid::new_v4(), bytes.clone(), "application/pdf"))
            .await
            .unwrap();
        let b = h
            .gateway
            .ingest(request(Uuid::new_v4(), bytes, "application/pdf"))
            .await
            .unwrap();

        assert_ne!(a.receipt.id, b.receipt.id);
        assert_eq!(h.repo.count(), 2);
    }

    #[tokio::test]
    async fn test_oversize_rejected_before_side_effects() {
        let h = harness();
        let err = h
            .gateway
            .ingest(request(
                Uuid::new_v4(),
                jpeg_bytes(10 * 1024 * 1024 + 1),
                "image/jpeg",
            ))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "too_large");
        assert_eq!(h.storage.file_count(), 0);
        assert_eq!(h.repo.count(), 0);
    }

    #[tokio::test]
    async fn test_label_signature_mismatch_rejected() {
        let h = harness();
        let err = h
            .gateway
            .ingest(request(Uuid::new_v4(), pdf_bytes(), "image/jpeg"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unsupported_type");

        let err = h
            .gateway
            .ingest(request(Uuid::new_v4(), b"GIF89a-not-a-receipt".to_vec(), "image/jpeg"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unsupported_type");
        assert_eq!(h.storage.file_count(), 0);
    }

    #[tokio::test]
    async fn test_generic_label_uses_sniffed_type() {
        let h = harness();
        let tenant_id = Uuid::new_v4();
        let outcome = h
            .gateway
            .ingest(request(tenant_id, pdf_bytes(), "application/octet-stream"))
            .await
            .unwrap();
        let stored = h.repo.get(tenant_id, outcome.receipt.id).unwrap();
        assert_eq!(stored.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_sniffed_type_must_be_allowed() {
        let h = harness();
        let mut webp = b"RIFF\x24\0\0\0WEBPVP8 ".to_vec();
        webp.extend_from_slice(&[0u8; 64]);
        let err = h
            .gateway
            .ingest(request(Uuid::new_v4(), webp, "image/webp"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unsupported_type");
    }

    #[tokio::test]
    async fn test_plan_limit_reports_counters() {
        let h = harness_with(StubWorker::accepting(), StubQuota::exhausted(50, 50));
        let err = h
            .gateway
            .ingest(request(Uuid::new_v4(), jpeg_bytes(1024), "image/jpeg"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::PlanLimitReached { used: 50, limit: 50 }
        ));
        assert_eq!(h.storage.file_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_creates_no_record() {
        let h = harness();
        h.storage.fail_uploads(true);

        let err = h
            .gateway
            .ingest(request(Uuid::new_v4(), jpeg_bytes(1024), "image/jpeg"))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "storage_failed");
        assert_eq!(h.repo.count(), 0);
        assert!(h.worker.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_releases_blob() {
        let h = harness();
        h.repo.fail_creates(true);

        let err = h
            .gateway
            .ingest(request(Uuid::new_v4(), jpeg_bytes(1024), "image/jpeg"))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "internal_error");
        assert_eq!(h.storage.file_count(), 0);
        assert!(h.worker.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_fingerprint_race_surfaces_as_duplicate() {
        let h = harness();
        let tenant_id = Uuid::new_v4();
        let bytes = jpeg_bytes(2048);
        let winner = crate::testing::sample_receipt(tenant_id, &bytes);
        // The winner is invisible to the duplicate check but holds the index.
        h.repo.reserve_fingerprint_after_lookup(winner.clone());

        let err = h
            .gateway
            .ingest(request(tenant_id, bytes, "image/jpeg"))
            .await
            .unwrap_err();

        match err {
            IngestError::Duplicate { existing_id, .. } => assert_eq!(existing_id, winner.id),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(h.storage.file_count(), 0);
    }

    #[tokio::test]
    async fn test_email_provenance_persisted_and_forwarded() {
        let h = harness();
        let tenant_id = Uuid::new_v4();
        let mut req = request(tenant_id, jpeg_bytes(512), "image/jpeg");
        req.email_provenance = Some(EmailProvenance {
            from: Some("orders@shop.example".to_string()),
            subject: Some("Your receipt".to_string()),
            message_id: None,
            received_at: None,
        });

        let outcome = h.gateway.ingest(req).await.unwrap();

        let stored = h.repo.get(tenant_id, outcome.receipt.id).unwrap();
        assert_eq!(
            stored.provenance().unwrap().from.as_deref(),
            Some("orders@shop.example")
        );
        let sent = &h.worker.submissions()[0];
        assert_eq!(
            sent.email_provenance.as_ref().unwrap().subject.as_deref(),
            Some("Your receipt")
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("scan (1).pdf"), "scan _1_.pdf");
        assert_eq!(sanitize_filename(""), "receipt");
    }
}
