//! Test helpers: build AppState and router against in-memory doubles.
//!
//! Run from workspace root: `cargo test -p reclaim-api`. No database, storage
//! service or extraction worker is needed.

use axum_test::TestServer;
use reclaim_api::constants;
use reclaim_api::setup::routes;
use reclaim_api::state::{AppState, ReceiptState, SecurityConfig};
use reclaim_core::{Clock, QuotaGate, SystemClock};
use reclaim_services::testing::{
    InMemoryLineItemRepository, InMemoryReceiptRepository, InMemoryStorage,
    InMemoryWarrantyRepository, RecordingAuditSink, StubQuota, StubWorker,
};
use reclaim_services::{
    ExtractionDispatcher, HeuristicWarrantyResolver, IngestGateway, IngestSettings,
    StuckJobReaper, WarrantyEngine, WarrantyResolver,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const TEST_WORKER_SECRET: &str = "test-worker-secret-0123456789abcdef";
pub const MAX_RECEIPT_BYTES: usize = 64 * 1024;

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Test application: server plus handles on every double behind it.
pub struct TestApp {
    pub server: TestServer,
    pub receipts: InMemoryReceiptRepository,
    pub items: InMemoryLineItemRepository,
    pub warranties: InMemoryWarrantyRepository,
    pub storage: InMemoryStorage,
    pub worker: Arc<StubWorker>,
    pub audit: Arc<RecordingAuditSink>,
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

/// Accepting worker, no plan limit.
pub fn setup_test_app() -> TestApp {
    setup_test_app_with(StubWorker::accepting(), StubQuota::unlimited())
}

pub fn setup_test_app_with(worker: StubWorker, quota: StubQuota) -> TestApp {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let receipts = InMemoryReceiptRepository::new();
    let items = InMemoryLineItemRepository::new();
    let warranties = InMemoryWarrantyRepository::new();
    let storage = InMemoryStorage::new();
    let worker = Arc::new(worker);
    let audit = Arc::new(RecordingAuditSink::new());

    let dispatcher = Arc::new(ExtractionDispatcher::new(
        worker.clone(),
        Arc::new(receipts.clone()),
        audit.clone(),
        clock.clone(),
    ));

    let quota: Arc<dyn QuotaGate> = Arc::new(quota);
    let gateway = Arc::new(IngestGateway::new(
        Arc::new(receipts.clone()),
        Arc::new(storage.clone()),
        quota,
        dispatcher.clone(),
        audit.clone(),
        clock.clone(),
        IngestSettings {
            max_size_bytes: MAX_RECEIPT_BYTES as u64,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/heic".to_string(),
                "application/pdf".to_string(),
            ],
        },
    ));

    let reaper = Arc::new(StuckJobReaper::new(
        Arc::new(receipts.clone()),
        dispatcher,
        audit.clone(),
        clock.clone(),
    ));

    let resolvers: Vec<Arc<dyn WarrantyResolver>> = vec![Arc::new(
        HeuristicWarrantyResolver::new().expect("heuristic patterns compile"),
    )];
    let warranty = Arc::new(WarrantyEngine::new(
        Arc::new(receipts.clone()),
        Arc::new(items.clone()),
        Arc::new(warranties.clone()),
        resolvers,
        audit.clone(),
        clock.clone(),
    ));

    let state = Arc::new(AppState {
        pool: None,
        receipts: ReceiptState {
            repository: Arc::new(receipts.clone()),
            storage: Arc::new(storage.clone()),
            gateway,
            signed_url_ttl: Duration::from_secs(900),
            max_receipt_size_bytes: MAX_RECEIPT_BYTES,
        },
        warranty,
        reaper,
        audit: audit.clone(),
        clock,
        security: SecurityConfig {
            internal_secret: TEST_WORKER_SECRET.to_string(),
            cors_origins: vec!["*".to_string()],
        },
    });

    let router = routes::setup_routes(state).expect("router builds");
    let server = TestServer::new(router.into_make_service()).expect("test server starts");

    TestApp {
        server,
        receipts,
        items,
        warranties,
        storage,
        worker,
        audit,
        tenant_id: Uuid::new_v4(),
        actor_id: Uuid::new_v4(),
    }
}
