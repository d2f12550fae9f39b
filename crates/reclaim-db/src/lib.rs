//! Reclaim Database Layer
//!
//! Postgres repositories for receipts, line items and warranty records, plus
//! the Postgres-backed rate-limit counters and audit sink. Services depend on
//! the traits in `repository_traits` so they can run against in-memory doubles.

pub mod db;
pub mod repository_traits;

pub use db::{
    PgAuditSink, PgLineItemRepository, PgRateLimiter, PgReceiptRepository, PgWarrantyRepository,
};
pub use repository_traits::{
    CreateReceiptOutcome, LineItemRepository, ReceiptRepository, WarrantyRepository,
};
