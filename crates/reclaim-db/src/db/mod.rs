//! Postgres repositories
//
// Receipts, line items and warranty records
pub mod line_item;
pub mod receipt;
pub mod warranty;
//
// Shared counters and audit trail
pub mod audit;
pub mod rate_limit;

pub use audit::PgAuditSink;
pub use line_item::PgLineItemRepository;
pub use rate_limit::PgRateLimiter;
pub use receipt::PgReceiptRepository;
pub use warranty::PgWarrantyRepository;
