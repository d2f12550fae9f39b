use reclaim_core::{AuditEvent, AuditSink};

/// Emits audit events as structured log lines on the `audit` target.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());

        tracing::event!(
            target: "audit",
            tracing::Level::INFO,
            audit_entry = %json,
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            actor_id = ?event.actor_id,
            entity_type = event.entity_type,
            entity_id = %event.entity_id,
            "Audit event"
        );
    }
}
