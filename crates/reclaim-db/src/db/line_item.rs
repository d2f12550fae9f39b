use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use reclaim_core::models::{LineItem, WarrantyLookupResult};

use crate::repository_traits::LineItemRepository;

#[derive(Clone)]
pub struct PgLineItemRepository {
    pool: PgPool,
}

impl PgLineItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LineItemRepository for PgLineItemRepository {
    #[tracing::instrument(skip(self), fields(db.table = "line_items", db.operation = "select"))]
    async fn get_line_item(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<LineItem>> {
        let item = sqlx::query_as::<Postgres, LineItem>(
            r#"
            SELECT
                id, receipt_id, tenant_id, name, description, price,
                warranty_eligible, track_warranty, warranty_lookup_status,
                warranty_end_date, warranty_checked_at, warranty_confidence,
                warranty_source, warranty_error, warranty_lookup_started_at,
                created_at, updated_at
            FROM line_items
            WHERE tenant_id = $1 AND receipt_id = $2 AND id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(receipt_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch line item")?;

        Ok(item)
    }

    #[tracing::instrument(skip(self), fields(db.table = "line_items", db.operation = "update"))]
    async fn claim_warranty_lookup(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<LineItem>> {
        let item = sqlx::query_as::<Postgres, LineItem>(
            r#"
            UPDATE line_items
            SET warranty_lookup_status = 'in_progress',
                warranty_lookup_started_at = $4,
                updated_at = $4
            WHERE tenant_id = $1 AND receipt_id = $2 AND id = $3
                AND (
                    warranty_lookup_status <> 'in_progress'
                    OR warranty_lookup_started_at IS NULL
                    OR warranty_lookup_started_at < $5
                )
            RETURNING
                id, receipt_id, tenant_id, name, description, price,
                warranty_eligible, track_warranty, warranty_lookup_status,
                warranty_end_date, warranty_checked_at, warranty_confidence,
                warranty_source, warranty_error, warranty_lookup_started_at,
                created_at, updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(receipt_id)
        .bind(item_id)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim warranty lookup")?;

        Ok(item)
    }

    #[tracing::instrument(skip(self, result), fields(db.table = "line_items", db.operation = "update", status = %result.status))]
    async fn record_warranty_result(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
        result: &WarrantyLookupResult,
    ) -> Result<LineItem> {
        let item = sqlx::query_as::<Postgres, LineItem>(
            r#"
            UPDATE line_items
            SET warranty_lookup_status = $4,
                warranty_eligible = $5,
                warranty_end_date = $6,
                warranty_confidence = $7,
                warranty_source = $8,
                warranty_error = $9,
                warranty_checked_at = $10,
                warranty_lookup_started_at = NULL,
                updated_at = $10
            WHERE tenant_id = $1 AND receipt_id = $2 AND id = $3
            RETURNING
                id, receipt_id, tenant_id, name, description, price,
                warranty_eligible, track_warranty, warranty_lookup_status,
                warranty_end_date, warranty_checked_at, warranty_confidence,
                warranty_source, warranty_error, warranty_lookup_started_at,
                created_at, updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(receipt_id)
        .bind(item_id)
        .bind(result.status)
        .bind(result.eligible)
        .bind(result.end_date)
        .bind(result.confidence)
        .bind(result.source)
        .bind(&result.error)
        .bind(result.checked_at)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to record warranty lookup result")?;

        item.ok_or_else(|| anyhow::anyhow!("Line item {} not found", item_id))
    }
}
