use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use reclaim_core::models::{NewReceipt, ReceiptRecord};
use reclaim_core::ContentFingerprint;

use crate::repository_traits::{CreateReceiptOutcome, ReceiptRepository};

#[derive(Clone)]
pub struct PgReceiptRepository {
    pool: PgPool,
}

impl PgReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_fingerprint_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                && db_err
                    .constraint()
                    .map(|c| c == "idx_receipts_tenant_fingerprint")
                    .unwrap_or(true)
        }
        _ => false,
    }
}

#[async_trait]
impl ReceiptRepository for PgReceiptRepository {
    #[tracing::instrument(skip(self, receipt), fields(db.table = "receipts", db.operation = "insert", tenant_id = %receipt.tenant_id))]
    async fn create_receipt(&self, receipt: NewReceipt) -> Result<CreateReceiptOutcome> {
        let provenance = receipt
            .email_provenance
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(serde_json::to_value)
            .transpose()
            .context("Failed to serialize email provenance")?;

        let result = sqlx::query_as::<Postgres, ReceiptRecord>(
            r#"
            INSERT INTO receipts (
                id, tenant_id, owner_id, content_fingerprint, storage_key,
                content_type, file_size, original_filename, status, needs_review,
                email_provenance, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', FALSE, $9, $10, $10)
            RETURNING
                id, tenant_id, owner_id, content_fingerprint, storage_key,
                content_type, file_size, original_filename, status, confidence_score,
                needs_review, merchant, purchase_date, email_provenance,
                created_at, updated_at, reviewed_at, exported_at
            "#,
        )
        .bind(receipt.id)
        .bind(receipt.tenant_id)
        .bind(receipt.owner_id)
        .bind(receipt.content_fingerprint.as_str())
        .bind(&receipt.storage_key)
        .bind(&receipt.content_type)
        .bind(receipt.file_size)
        .bind(&receipt.original_filename)
        .bind(provenance)
        .bind(receipt.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => {
                tracing::debug!(
                    receipt_id = %record.id,
                    tenant_id = %record.tenant_id,
                    "Receipt inserted"
                );
                Ok(CreateReceiptOutcome::Created(record))
            }
            Err(e) if is_fingerprint_conflict(&e) => {
                tracing::info!(
                    tenant_id = %receipt.tenant_id,
                    fingerprint = %receipt.content_fingerprint,
                    "Receipt insert lost fingerprint race"
                );
                Ok(CreateReceiptOutcome::FingerprintTaken)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to insert receipt")),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "select"))]
    async fn get_receipt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>> {
        let record = sqlx::query_as::<Postgres, ReceiptRecord>(
            r#"
            SELECT
                id, tenant_id, owner_id, content_fingerprint, storage_key,
                content_type, file_size, original_filename, status, confidence_score,
                needs_review, merchant, purchase_date, email_provenance,
                created_at, updated_at, reviewed_at, exported_at
            FROM receipts
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch receipt")?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, fingerprint), fields(db.table = "receipts", db.operation = "select"))]
    async fn find_by_fingerprint(
        &self,
        tenant_id: Uuid,
        fingerprint: &ContentFingerprint,
    ) -> Result<Option<ReceiptRecord>> {
        let record = sqlx::query_as::<Postgres, ReceiptRecord>(
            r#"
            SELECT
                id, tenant_id, owner_id, content_fingerprint, storage_key,
                content_type, file_size, original_filename, status, confidence_score,
                needs_review, merchant, purchase_date, email_provenance,
                created_at, updated_at, reviewed_at, exported_at
            FROM receipts
            WHERE tenant_id = $1 AND content_fingerprint = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up receipt by fingerprint")?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "update"))]
    async fn mark_needs_review(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ReceiptRecord>> {
        let record = sqlx::query_as::<Postgres, ReceiptRecord>(
            r#"
            UPDATE receipts
            SET status = 'in_review',
                needs_review = TRUE,
                confidence_score = 0,
                updated_at = $3
            WHERE tenant_id = $1 AND id = $2 AND status = 'pending'
            RETURNING
                id, tenant_id, owner_id, content_fingerprint, storage_key,
                content_type, file_size, original_filename, status, confidence_score,
                needs_review, merchant, purchase_date, email_provenance,
                created_at, updated_at, reviewed_at, exported_at
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to move receipt to review")?;

        Ok(record)
    }

    /// Cross-tenant on purpose: the reaper sweeps every tenant's stuck work.
    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "select"))]
    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReceiptRecord>> {
        let records = sqlx::query_as::<Postgres, ReceiptRecord>(
            r#"
            SELECT
                id, tenant_id, owner_id, content_fingerprint, storage_key,
                content_type, file_size, original_filename, status, confidence_score,
                needs_review, merchant, purchase_date, email_provenance,
                created_at, updated_at, reviewed_at, exported_at
            FROM receipts
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list stale pending receipts")?;

        Ok(records)
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "count"))]
    async fn count_created_since(&self, tenant_id: Uuid, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)::bigint
            FROM receipts
            WHERE tenant_id = $1 AND created_at >= $2
            "#,
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count receipts")?;

        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "delete"))]
    async fn delete_receipt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>> {
        let record = sqlx::query_as::<Postgres, ReceiptRecord>(
            r#"
            DELETE FROM receipts
            WHERE tenant_id = $1 AND id = $2
            RETURNING
                id, tenant_id, owner_id, content_fingerprint, storage_key,
                content_type, file_size, original_filename, status, confidence_score,
                needs_review, merchant, purchase_date, email_provenance,
                created_at, updated_at, reviewed_at, exported_at
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to delete receipt")?;

        if let Some(ref r) = record {
            tracing::info!(receipt_id = %r.id, tenant_id = %tenant_id, "Receipt deleted");
        }

        Ok(record)
    }
}
