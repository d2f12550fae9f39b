use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Where a warranty result came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum WarrantySource {
    Receipt,
    AiLookup,
}

impl WarrantySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarrantySource::Receipt => "receipt",
            WarrantySource::AiLookup => "ai_lookup",
        }
    }
}

/// Derived warranty coverage, at most one per (tenant, receipt, line item).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WarrantyRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub receipt_id: Uuid,
    pub line_item_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub confidence: Option<f64>,
    pub source: WarrantySource,
    pub source_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written by a warranty upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct WarrantyUpsert {
    pub tenant_id: Uuid,
    pub receipt_id: Uuid,
    pub line_item_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub confidence: Option<f64>,
    pub source: WarrantySource,
    pub source_urls: Vec<String>,
}
