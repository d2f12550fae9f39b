use async_trait::async_trait;
use chrono::{Months, NaiveDate};
use reclaim_core::models::{LineItem, ReceiptRecord, WarrantySource};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// What a resolver knows about the item being checked.
#[derive(Debug, Clone, Serialize)]
pub struct WarrantyQuery {
    pub tenant_id: Uuid,
    pub receipt_id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub description: Option<String>,
    pub merchant: Option<String>,
    pub purchase_date: NaiveDate,
    pub price: Option<Decimal>,
}

impl WarrantyQuery {
    pub fn new(receipt: &ReceiptRecord, item: &LineItem, purchase_date: NaiveDate) -> Self {
        Self {
            tenant_id: receipt.tenant_id,
            receipt_id: receipt.id,
            item_id: item.id,
            item_name: item.name.clone(),
            description: item.description.clone(),
            merchant: receipt.merchant.clone(),
            purchase_date,
            price: item.price,
        }
    }
}

/// Coverage produced by a resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWarranty {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub confidence: Option<f64>,
    pub source: WarrantySource,
    pub source_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolverOutcome {
    Matched(ResolvedWarranty),
    NoMatch { reason: String },
    Error(String),
}

impl ResolverOutcome {
    pub fn no_match(reason: impl Into<String>) -> Self {
        ResolverOutcome::NoMatch {
            reason: reason.into(),
        }
    }
}

/// One tier of warranty resolution. Resolvers never fail the check: problems
/// are reported as [`ResolverOutcome::Error`] and the engine moves on.
#[async_trait]
pub trait WarrantyResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, query: &WarrantyQuery) -> ResolverOutcome;
}

/// Keep a confidence only if it is a finite number within `[0, 1]`.
pub fn normalize_confidence(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && (0.0..=1.0).contains(v))
}

/// `date` plus `months` calendar months, clamped to the month's last day.
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}
