use std::sync::Arc;

use reclaim_core::models::ReceiptRecord;
use reclaim_core::ContentFingerprint;
use reclaim_db::ReceiptRepository;
use uuid::Uuid;

/// Looks up an earlier upload of the same bytes inside one tenant.
///
/// This is a precondition check for ingest, never a merge: a hit means the new
/// upload is rejected and the original record is left untouched.
#[derive(Clone)]
pub struct DuplicateDetector {
    receipts: Arc<dyn ReceiptRepository>,
}

impl DuplicateDetector {
    pub fn new(receipts: Arc<dyn ReceiptRepository>) -> Self {
        Self { receipts }
    }

    /// Most recent receipt in `tenant_id` with this fingerprint, if any.
    #[tracing::instrument(skip(self, fingerprint), fields(fingerprint = %fingerprint))]
    pub async fn find_existing(
        &self,
        tenant_id: Uuid,
        fingerprint: &ContentFingerprint,
    ) -> Result<Option<ReceiptRecord>, anyhow::Error> {
        let existing = self
            .receipts
            .find_by_fingerprint(tenant_id, fingerprint)
            .await?;

        if let Some(ref record) = existing {
            tracing::debug!(
                tenant_id = %tenant_id,
                existing_id = %record.id,
                existing_status = %record.status,
                "Duplicate fingerprint found"
            );
        }

        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_receipt, InMemoryReceiptRepository};

    #[tokio::test]
    async fn test_finds_receipt_in_same_tenant() {
        let repo = Arc::new(InMemoryReceiptRepository::new());
        let tenant_id = Uuid::new_v4();
        let original = sample_receipt(tenant_id, b"receipt bytes");
        repo.insert(original.clone());

        let detector = DuplicateDetector::new(repo);
        let found = detector
            .find_existing(tenant_id, &ContentFingerprint::of(b"receipt bytes"))
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(original.id));
    }

    #[tokio::test]
    async fn test_cross_tenant_fingerprint_never_matches() {
        let repo = Arc::new(InMemoryReceiptRepository::new());
        repo.insert(sample_receipt(Uuid::new_v4(), b"receipt bytes"));

        let detector = DuplicateDetector::new(repo);
        let found = detector
            .find_existing(Uuid::new_v4(), &ContentFingerprint::of(b"receipt bytes"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_returns_most_recent_match() {
        let repo = Arc::new(InMemoryReceiptRepository::new());
        let tenant_id = Uuid::new_v4();
        let older = sample_receipt(tenant_id, b"same");
        let mut newer = sample_receipt(tenant_id, b"same");
        newer.created_at = older.created_at + chrono::Duration::minutes(5);
        repo.insert(older);
        repo.insert(newer.clone());

        let detector = DuplicateDetector::new(repo);
        let found = detector
            .find_existing(tenant_id, &ContentFingerprint::of(b"same"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer.id);
    }
}
