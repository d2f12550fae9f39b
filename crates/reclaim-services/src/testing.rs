//! In-memory test doubles
//!
//! Repositories, storage, extraction worker, quota gate, audit sink and AI
//! provider that run without a database or network. Used by the service unit
//! tests and, through the `testing` feature, by the API tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reclaim_core::models::{
    LineItem, NewReceipt, ReceiptRecord, ReceiptStatus, WarrantyLookupResult,
    WarrantyLookupStatus, WarrantyRecord, WarrantyUpsert,
};
use reclaim_core::{
    AuditEvent, AuditEventType, AuditSink, ContentFingerprint, QuotaDecision, QuotaGate,
    StorageBackend,
};
use reclaim_db::{CreateReceiptOutcome, LineItemRepository, ReceiptRepository, WarrantyRepository};
use reclaim_storage::{Storage, StorageError, StorageResult};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::dispatch::{DispatchError, ExtractionPayload, ExtractionWorker};
use crate::warranty::{AiWarrantyAnswer, WarrantyAiProvider, WarrantyQuery};

/// A JPEG-signed buffer of exactly `len` bytes (minimum 4).
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.resize(len.max(4), 0x42);
    data
}

pub fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\ntrailer << /Root 1 0 R >>\n%%EOF\n"
        .to_vec()
}

/// A `pending` receipt for `tenant_id` whose fingerprint is the hash of `bytes`.
pub fn sample_receipt(tenant_id: Uuid, bytes: &[u8]) -> ReceiptRecord {
    let id = Uuid::new_v4();
    let now = Utc::now();
    ReceiptRecord {
        id,
        tenant_id,
        owner_id: Uuid::new_v4(),
        content_fingerprint: ContentFingerprint::of(bytes).to_string(),
        storage_key: format!("receipts/{}/{}.jpg", tenant_id, id),
        content_type: "image/jpeg".to_string(),
        file_size: bytes.len() as i64,
        original_filename: Some("receipt.jpg".to_string()),
        status: ReceiptStatus::Pending,
        confidence_score: None,
        needs_review: false,
        merchant: None,
        purchase_date: None,
        email_provenance: None,
        created_at: now,
        updated_at: now,
        reviewed_at: None,
        exported_at: None,
    }
}

/// An unchecked line item on `receipt`.
pub fn sample_line_item(receipt: &ReceiptRecord, name: &str, price: Option<Decimal>) -> LineItem {
    let now = Utc::now();
    LineItem {
        id: Uuid::new_v4(),
        receipt_id: receipt.id,
        tenant_id: receipt.tenant_id,
        name: name.to_string(),
        description: None,
        price,
        warranty_eligible: false,
        track_warranty: true,
        warranty_lookup_status: WarrantyLookupStatus::Unknown,
        warranty_end_date: None,
        warranty_checked_at: None,
        warranty_confidence: None,
        warranty_source: None,
        warranty_error: None,
        warranty_lookup_started_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// A receipt with merchant and purchase date set, as left by extraction.
pub fn extracted_receipt(tenant_id: Uuid, merchant: &str, purchase_date: NaiveDate) -> ReceiptRecord {
    let mut receipt = sample_receipt(tenant_id, Uuid::new_v4().as_bytes());
    receipt.status = ReceiptStatus::Complete;
    receipt.merchant = Some(merchant.to_string());
    receipt.purchase_date = Some(purchase_date);
    receipt
}

/// Mock receipt repository for testing without database
#[derive(Clone, Default)]
pub struct InMemoryReceiptRepository {
    receipts: Arc<Mutex<HashMap<(Uuid, Uuid), ReceiptRecord>>>,
    fail_creates: Arc<AtomicBool>,
    race_winner: Arc<Mutex<Option<ReceiptRecord>>>,
}

impl InMemoryReceiptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ReceiptRecord) {
        self.receipts
            .lock()
            .unwrap()
            .insert((record.tenant_id, record.id), record);
    }

    pub fn get(&self, tenant_id: Uuid, id: Uuid) -> Option<ReceiptRecord> {
        self.receipts.lock().unwrap().get(&(tenant_id, id)).cloned()
    }

    pub fn count(&self) -> usize {
        self.receipts.lock().unwrap().len()
    }

    /// Make `create_receipt` return an error.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Simulate a concurrent upload that commits `winner` between the caller's
    /// duplicate check and its insert.
    pub fn reserve_fingerprint_after_lookup(&self, winner: ReceiptRecord) {
        *self.race_winner.lock().unwrap() = Some(winner);
    }
}

#[async_trait]
impl ReceiptRepository for InMemoryReceiptRepository {
    async fn create_receipt(&self, receipt: NewReceipt) -> Result<CreateReceiptOutcome> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("simulated database failure"));
        }

        let fingerprint = receipt.content_fingerprint.to_string();

        if let Some(winner) = self.race_winner.lock().unwrap().take() {
            if winner.tenant_id == receipt.tenant_id && winner.content_fingerprint == fingerprint {
                self.insert(winner);
                return Ok(CreateReceiptOutcome::FingerprintTaken);
            }
        }

        let mut receipts = self.receipts.lock().unwrap();
        if receipts.values().any(|r| {
            r.tenant_id == receipt.tenant_id && r.content_fingerprint == fingerprint
        }) {
            return Ok(CreateReceiptOutcome::FingerprintTaken);
        }

        let record = ReceiptRecord {
            id: receipt.id,
            tenant_id: receipt.tenant_id,
            owner_id: receipt.owner_id,
            content_fingerprint: fingerprint,
            storage_key: receipt.storage_key,
            content_type: receipt.content_type,
            file_size: receipt.file_size,
            original_filename: receipt.original_filename,
            status: ReceiptStatus::Pending,
            confidence_score: None,
            needs_review: false,
            merchant: None,
            purchase_date: None,
            email_provenance: receipt
                .email_provenance
                .map(serde_json::to_value)
                .transpose()?,
            created_at: receipt.created_at,
            updated_at: receipt.created_at,
            reviewed_at: None,
            exported_at: None,
        };
        receipts.insert((record.tenant_id, record.id), record.clone());
        Ok(CreateReceiptOutcome::Created(record))
    }

    async fn get_receipt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>> {
        Ok(self.get(tenant_id, id))
    }

    async fn find_by_fingerprint(
        &self,
        tenant_id: Uuid,
        fingerprint: &ContentFingerprint,
    ) -> Result<Option<ReceiptRecord>> {
        Ok(self
            .receipts
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.content_fingerprint == fingerprint.as_str())
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn mark_needs_review(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ReceiptRecord>> {
        let mut receipts = self.receipts.lock().unwrap();
        match receipts.get_mut(&(tenant_id, id)) {
            Some(record) if record.status == ReceiptStatus::Pending => {
                record.status = ReceiptStatus::InReview;
                record.needs_review = true;
                record.confidence_score = Some(0.0);
                record.updated_at = now;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReceiptRecord>> {
        let mut stale: Vec<ReceiptRecord> = self
            .receipts
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == ReceiptStatus::Pending && r.created_at < created_before)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn count_created_since(&self, tenant_id: Uuid, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .receipts
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.created_at >= since)
            .count() as i64)
    }

    async fn delete_receipt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ReceiptRecord>> {
        Ok(self.receipts.lock().unwrap().remove(&(tenant_id, id)))
    }
}

/// Mock line item repository keyed by (tenant, item).
#[derive(Clone, Default)]
pub struct InMemoryLineItemRepository {
    items: Arc<Mutex<HashMap<(Uuid, Uuid), LineItem>>>,
}

impl InMemoryLineItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: LineItem) {
        self.items
            .lock()
            .unwrap()
            .insert((item.tenant_id, item.id), item);
    }

    pub fn get(&self, tenant_id: Uuid, id: Uuid) -> Option<LineItem> {
        self.items.lock().unwrap().get(&(tenant_id, id)).cloned()
    }
}

#[async_trait]
impl LineItemRepository for InMemoryLineItemRepository {
    async fn get_line_item(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<LineItem>> {
        Ok(self
            .get(tenant_id, item_id)
            .filter(|item| item.receipt_id == receipt_id))
    }

    async fn claim_warranty_lookup(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<LineItem>> {
        let mut items = self.items.lock().unwrap();
        let item = match items.get_mut(&(tenant_id, item_id)) {
            Some(item) if item.receipt_id == receipt_id => item,
            _ => return Ok(None),
        };

        let claimable = item.warranty_lookup_status != WarrantyLookupStatus::InProgress
            || item
                .warranty_lookup_started_at
                .map(|started| started < stale_before)
                .unwrap_or(true);
        if !claimable {
            return Ok(None);
        }

        item.warranty_lookup_status = WarrantyLookupStatus::InProgress;
        item.warranty_lookup_started_at = Some(now);
        item.updated_at = now;
        Ok(Some(item.clone()))
    }

    async fn record_warranty_result(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        item_id: Uuid,
        result: &WarrantyLookupResult,
    ) -> Result<LineItem> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(&(tenant_id, item_id))
            .filter(|item| item.receipt_id == receipt_id)
            .ok_or_else(|| anyhow::anyhow!("Line item {} not found", item_id))?;

        item.warranty_lookup_status = result.status;
        item.warranty_eligible = result.eligible;
        item.warranty_end_date = result.end_date;
        item.warranty_confidence = result.confidence;
        item.warranty_source = result.source;
        item.warranty_error = result.error.clone();
        item.warranty_checked_at = Some(result.checked_at);
        item.warranty_lookup_started_at = None;
        item.updated_at = result.checked_at;
        Ok(item.clone())
    }
}

/// Mock warranty repository keyed by (tenant, receipt, item).
#[derive(Clone, Default)]
pub struct InMemoryWarrantyRepository {
    records: Arc<Mutex<HashMap<(Uuid, Uuid, Uuid), WarrantyRecord>>>,
}

impl InMemoryWarrantyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, tenant_id: Uuid, receipt_id: Uuid, item_id: Uuid) -> Option<WarrantyRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(tenant_id, receipt_id, item_id))
            .cloned()
    }
}

#[async_trait]
impl WarrantyRepository for InMemoryWarrantyRepository {
    async fn upsert_warranty(
        &self,
        warranty: WarrantyUpsert,
        now: DateTime<Utc>,
    ) -> Result<WarrantyRecord> {
        let key = (warranty.tenant_id, warranty.receipt_id, warranty.line_item_id);
        let mut records = self.records.lock().unwrap();
        let (id, created_at) = records
            .get(&key)
            .map(|existing| (existing.id, existing.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));

        let record = WarrantyRecord {
            id,
            tenant_id: warranty.tenant_id,
            receipt_id: warranty.receipt_id,
            line_item_id: warranty.line_item_id,
            start_date: warranty.start_date,
            end_date: warranty.end_date,
            category: warranty.category,
            manufacturer: warranty.manufacturer,
            confidence: warranty.confidence,
            source: warranty.source,
            source_urls: warranty.source_urls,
            created_at,
            updated_at: now,
        };
        records.insert(key, record.clone());
        Ok(record)
    }
}

/// Mock storage implementation that stores files in memory
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_uploads: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn upload(
        &self,
        tenant_id: Uuid,
        filename: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed(
                "simulated storage outage".to_string(),
            ));
        }
        let storage_key = format!("receipts/{}/{}", tenant_id, filename);
        self.files.lock().unwrap().insert(storage_key.clone(), data);
        let storage_url = format!("https://storage.test/{}", storage_key);
        Ok((storage_key, storage_url))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::DeleteFailed(
                "simulated storage outage".to_string(),
            ));
        }
        self.files.lock().unwrap().remove(storage_key);
        Ok(())
    }

    async fn get_presigned_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        if !self.has_file(storage_key) {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }
        Ok(format!(
            "https://storage.test/signed/{}?expires_in={}",
            storage_key,
            expires_in.as_secs()
        ))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[derive(Debug, Clone, Copy)]
enum WorkerMode {
    Accept,
    Unreachable,
    Reject(u16),
}

/// Extraction worker double that records every submission.
pub struct StubWorker {
    mode: WorkerMode,
    fail_for: Mutex<HashSet<Uuid>>,
    submissions: Mutex<Vec<ExtractionPayload>>,
}

impl StubWorker {
    fn with_mode(mode: WorkerMode) -> Self {
        Self {
            mode,
            fail_for: Mutex::new(HashSet::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting() -> Self {
        Self::with_mode(WorkerMode::Accept)
    }

    pub fn unreachable() -> Self {
        Self::with_mode(WorkerMode::Unreachable)
    }

    pub fn rejecting(status: u16) -> Self {
        Self::with_mode(WorkerMode::Reject(status))
    }

    /// Fail with a connection error for this record only.
    pub fn fail_for(&self, record_id: Uuid) {
        self.fail_for.lock().unwrap().insert(record_id);
    }

    pub fn submissions(&self) -> Vec<ExtractionPayload> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionWorker for StubWorker {
    async fn submit(&self, payload: &ExtractionPayload) -> Result<(), DispatchError> {
        self.submissions.lock().unwrap().push(payload.clone());

        if self.fail_for.lock().unwrap().contains(&payload.record_id) {
            return Err(DispatchError::Unreachable("connection refused".to_string()));
        }

        match self.mode {
            WorkerMode::Accept => Ok(()),
            WorkerMode::Unreachable => {
                Err(DispatchError::Unreachable("connection refused".to_string()))
            }
            WorkerMode::Reject(status) => Err(DispatchError::Rejected {
                status,
                body: "rejected".to_string(),
            }),
        }
    }
}

/// Quota gate returning a fixed decision.
pub struct StubQuota {
    decision: QuotaDecision,
}

impl StubQuota {
    pub fn unlimited() -> Self {
        Self {
            decision: QuotaDecision::unlimited(0),
        }
    }

    pub fn exhausted(used: i64, limit: i64) -> Self {
        Self {
            decision: QuotaDecision {
                allowed: false,
                used,
                limit,
            },
        }
    }
}

#[async_trait]
impl QuotaGate for StubQuota {
    async fn check_upload(&self, _tenant_id: Uuid) -> Result<QuotaDecision, anyhow::Error> {
        Ok(self.decision)
    }
}

/// Audit sink that keeps every event for assertions.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<AuditEventType> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// AI provider double with a canned answer or failure.
pub struct StubAiProvider {
    answer: std::result::Result<AiWarrantyAnswer, String>,
    calls: AtomicUsize,
}

impl StubAiProvider {
    pub fn answering(answer: AiWarrantyAnswer) -> Self {
        Self {
            answer: Ok(answer),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarrantyAiProvider for StubAiProvider {
    async fn lookup(&self, _query: &WarrantyQuery) -> Result<AiWarrantyAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(|msg| anyhow::anyhow!(msg))
    }
}
