//! Hooks for external collaborators
//!
//! The pipeline consults a plan/quota service before accepting uploads and
//! appends audit events for every state-changing path. Both live outside this
//! repository; these traits are the seams they plug into.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

/// Result of a quota check for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: i64,
    pub limit: i64,
}

impl QuotaDecision {
    pub fn unlimited(used: i64) -> Self {
        Self {
            allowed: true,
            used,
            limit: 0,
        }
    }
}

/// Plan/eligibility gate consulted before an upload is accepted.
#[async_trait]
pub trait QuotaGate: Send + Sync {
    async fn check_upload(&self, tenant_id: Uuid) -> Result<QuotaDecision, anyhow::Error>;
}

/// Gate used when no plan limits apply.
pub struct UnlimitedQuota;

#[async_trait]
impl QuotaGate for UnlimitedQuota {
    async fn check_upload(&self, _tenant_id: Uuid) -> Result<QuotaDecision, anyhow::Error> {
        Ok(QuotaDecision::unlimited(0))
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum AuditEventType {
    #[serde(rename = "receipt.uploaded")]
    ReceiptUploaded,
    #[serde(rename = "receipt.duplicate_rejected")]
    ReceiptDuplicateRejected,
    #[serde(rename = "receipt.dispatch_failed")]
    ReceiptDispatchFailed,
    #[serde(rename = "receipt.redispatched")]
    ReceiptRedispatched,
    #[serde(rename = "receipt.deleted")]
    ReceiptDeleted,
    #[serde(rename = "warranty.resolved")]
    WarrantyResolved,
    #[serde(rename = "warranty.lookup_failed")]
    WarrantyLookupFailed,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::ReceiptUploaded => "receipt.uploaded",
            AuditEventType::ReceiptDuplicateRejected => "receipt.duplicate_rejected",
            AuditEventType::ReceiptDispatchFailed => "receipt.dispatch_failed",
            AuditEventType::ReceiptRedispatched => "receipt.redispatched",
            AuditEventType::ReceiptDeleted => "receipt.deleted",
            AuditEventType::WarrantyResolved => "warranty.resolved",
            AuditEventType::WarrantyLookupFailed => "warranty.lookup_failed",
        }
    }
}

impl Display for AuditEventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Audit event keyed by tenant/actor/entity/event type.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub tenant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub event_type: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        tenant_id: Uuid,
        entity_type: &'static str,
        entity_id: Uuid,
        event_type: AuditEventType,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            entity_type,
            entity_id,
            event_type,
            before: None,
            after: None,
            occurred_at,
        }
    }

    pub fn with_actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }
}

/// Fire-and-forget audit log sink. Implementations must not block the caller
/// and must swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}
