//! Application state shared by all handlers.
//!
//! Everything behind a trait is held as `Arc<dyn ..>` so the same router runs
//! against Postgres in production and in-memory doubles in tests.

use reclaim_core::{AuditSink, Clock};
use reclaim_db::ReceiptRepository;
use reclaim_services::{IngestGateway, StuckJobReaper, WarrantyEngine};
use reclaim_storage::Storage;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Receipt store, blob store and the ingest pipeline built on them.
#[derive(Clone)]
pub struct ReceiptState {
    pub repository: Arc<dyn ReceiptRepository>,
    pub storage: Arc<dyn Storage>,
    pub gateway: Arc<IngestGateway>,
    pub signed_url_ttl: Duration,
    pub max_receipt_size_bytes: usize,
}

#[derive(Clone)]
pub struct SecurityConfig {
    /// Shared secret for internal endpoints; the same one the extraction worker receives.
    pub internal_secret: String,
    pub cors_origins: Vec<String>,
}

pub struct AppState {
    /// `None` when running without a database (tests).
    pub pool: Option<PgPool>,
    pub receipts: ReceiptState,
    pub warranty: Arc<WarrantyEngine>,
    pub reaper: Arc<StuckJobReaper>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
    pub security: SecurityConfig,
}
