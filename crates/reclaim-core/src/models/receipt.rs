use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::fingerprint::ContentFingerprint;

/// Receipt lifecycle. `Pending` is transient: the extraction worker advances it,
/// or the dispatcher forces `InReview` when the handoff fails. A record never
/// returns to `Pending` once advanced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Pending,
    Processing,
    InReview,
    Complete,
    Exported,
    Archived,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Pending => "pending",
            ReceiptStatus::Processing => "processing",
            ReceiptStatus::InReview => "in_review",
            ReceiptStatus::Complete => "complete",
            ReceiptStatus::Exported => "exported",
            ReceiptStatus::Archived => "archived",
        }
    }
}

impl Display for ReceiptStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReceiptStatus::Pending),
            "processing" => Ok(ReceiptStatus::Processing),
            "in_review" => Ok(ReceiptStatus::InReview),
            "complete" => Ok(ReceiptStatus::Complete),
            "exported" => Ok(ReceiptStatus::Exported),
            "archived" => Ok(ReceiptStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid receipt status: {}", s)),
        }
    }
}

/// Where an emailed receipt came from. Forwarded to the extraction worker untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailProvenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl EmailProvenance {
    pub fn is_empty(&self) -> bool {
        self.from.is_none()
            && self.subject.is_none()
            && self.message_id.is_none()
            && self.received_at.is_none()
    }
}

/// One uploaded receipt document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReceiptRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub owner_id: Uuid,
    pub content_fingerprint: String,
    pub storage_key: String,
    pub content_type: String,
    pub file_size: i64,
    pub original_filename: Option<String>,
    pub status: ReceiptStatus,
    pub confidence_score: Option<f64>,
    pub needs_review: bool,
    pub merchant: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub email_provenance: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub exported_at: Option<DateTime<Utc>>,
}

impl ReceiptRecord {
    /// Email provenance, if the stored JSON is present and well-formed.
    pub fn provenance(&self) -> Option<EmailProvenance> {
        self.email_provenance
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn summary(&self) -> ReceiptSummary {
        ReceiptSummary {
            id: self.id,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Values for a new `pending` receipt row.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub owner_id: Uuid,
    pub content_fingerprint: ContentFingerprint,
    pub storage_key: String,
    pub content_type: String,
    pub file_size: i64,
    pub original_filename: Option<String>,
    pub email_provenance: Option<EmailProvenance>,
    pub created_at: DateTime<Utc>,
}

/// Created record summary returned by the ingest operation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReceiptSummary {
    pub id: Uuid,
    pub status: ReceiptStatus,
    pub created_at: DateTime<Utc>,
}
