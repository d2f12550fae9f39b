use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use reclaim_core::models::{WarrantyRecord, WarrantyUpsert};

use crate::repository_traits::WarrantyRepository;

#[derive(Clone)]
pub struct PgWarrantyRepository {
    pool: PgPool,
}

impl PgWarrantyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WarrantyRepository for PgWarrantyRepository {
    #[tracing::instrument(skip(self, warranty), fields(db.table = "warranty_records", db.operation = "upsert", line_item_id = %warranty.line_item_id))]
    async fn upsert_warranty(
        &self,
        warranty: WarrantyUpsert,
        now: DateTime<Utc>,
    ) -> Result<WarrantyRecord> {
        let record = sqlx::query_as::<Postgres, WarrantyRecord>(
            r#"
            INSERT INTO warranty_records (
                id, tenant_id, receipt_id, line_item_id, start_date, end_date,
                category, manufacturer, confidence, source, source_urls,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            ON CONFLICT (tenant_id, receipt_id, line_item_id) DO UPDATE SET
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                category = EXCLUDED.category,
                manufacturer = EXCLUDED.manufacturer,
                confidence = EXCLUDED.confidence,
                source = EXCLUDED.source,
                source_urls = EXCLUDED.source_urls,
                updated_at = EXCLUDED.updated_at
            RETURNING
                id, tenant_id, receipt_id, line_item_id, start_date, end_date,
                category, manufacturer, confidence, source, source_urls,
                created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(warranty.tenant_id)
        .bind(warranty.receipt_id)
        .bind(warranty.line_item_id)
        .bind(warranty.start_date)
        .bind(warranty.end_date)
        .bind(&warranty.category)
        .bind(&warranty.manufacturer)
        .bind(warranty.confidence)
        .bind(warranty.source)
        .bind(&warranty.source_urls)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert warranty record")?;

        Ok(record)
    }
}
