use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;
use uuid::Uuid;

use super::warranty::WarrantySource;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum WarrantyLookupStatus {
    Unknown,
    InProgress,
    Found,
    NotFound,
    Error,
    NotEligible,
}

impl WarrantyLookupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarrantyLookupStatus::Unknown => "unknown",
            WarrantyLookupStatus::InProgress => "in_progress",
            WarrantyLookupStatus::Found => "found",
            WarrantyLookupStatus::NotFound => "not_found",
            WarrantyLookupStatus::Error => "error",
            WarrantyLookupStatus::NotEligible => "not_eligible",
        }
    }

    /// Statuses whose result may be served from cache.
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self,
            WarrantyLookupStatus::Found | WarrantyLookupStatus::NotFound
        )
    }
}

impl Display for WarrantyLookupStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A line item belonging to exactly one receipt.
///
/// `warranty_lookup_status == Found` implies both `warranty_end_date` and
/// `warranty_checked_at` are set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LineItem {
    pub id: Uuid,
    pub receipt_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Option<f64>)]
    pub price: Option<Decimal>,
    pub warranty_eligible: bool,
    pub track_warranty: bool,
    pub warranty_lookup_status: WarrantyLookupStatus,
    pub warranty_end_date: Option<NaiveDate>,
    pub warranty_checked_at: Option<DateTime<Utc>>,
    pub warranty_confidence: Option<f64>,
    pub warranty_source: Option<WarrantySource>,
    pub warranty_error: Option<String>,
    #[serde(skip_serializing)]
    pub warranty_lookup_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal warranty fields written back to a line item after a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct WarrantyLookupResult {
    pub status: WarrantyLookupStatus,
    pub eligible: bool,
    pub end_date: Option<NaiveDate>,
    pub confidence: Option<f64>,
    pub source: Option<WarrantySource>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl WarrantyLookupResult {
    pub fn found(
        end_date: NaiveDate,
        confidence: Option<f64>,
        source: WarrantySource,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: WarrantyLookupStatus::Found,
            eligible: true,
            end_date: Some(end_date),
            confidence,
            source: Some(source),
            error: None,
            checked_at,
        }
    }

    pub fn not_found(checked_at: DateTime<Utc>) -> Self {
        Self {
            status: WarrantyLookupStatus::NotFound,
            eligible: false,
            end_date: None,
            confidence: None,
            source: None,
            error: None,
            checked_at,
        }
    }

    pub fn error(message: impl Into<String>, checked_at: DateTime<Utc>) -> Self {
        Self {
            status: WarrantyLookupStatus::Error,
            eligible: false,
            end_date: None,
            confidence: None,
            source: None,
            error: Some(message.into()),
            checked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_found_and_not_found_are_cacheable() {
        assert!(WarrantyLookupStatus::Found.is_cacheable());
        assert!(WarrantyLookupStatus::NotFound.is_cacheable());
        assert!(!WarrantyLookupStatus::Error.is_cacheable());
        assert!(!WarrantyLookupStatus::InProgress.is_cacheable());
        assert!(!WarrantyLookupStatus::Unknown.is_cacheable());
    }

    #[test]
    fn test_found_result_sets_end_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let result = WarrantyLookupResult::found(date, Some(0.6), WarrantySource::Receipt, Utc::now());
        assert_eq!(result.status, WarrantyLookupStatus::Found);
        assert_eq!(result.end_date, Some(date));
        assert!(result.error.is_none());
    }
}
