use reclaim_core::{AuditEvent, AuditSink};
use sqlx::PgPool;

/// Appends audit events to the `audit_events` table without blocking the caller.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_event(pool: &PgPool, event: &AuditEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_events (
            tenant_id, actor_id, entity_type, entity_id, event_type,
            before_state, after_state, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(event.tenant_id)
    .bind(event.actor_id)
    .bind(event.entity_type)
    .bind(event.entity_id)
    .bind(event.event_type.as_str())
    .bind(&event.before)
    .bind(&event.after)
    .bind(event.occurred_at)
    .execute(pool)
    .await?;
    Ok(())
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: AuditEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                event_type = %event.event_type,
                entity_id = %event.entity_id,
                "No runtime available, audit event dropped"
            );
            return;
        };

        let pool = self.pool.clone();
        handle.spawn(async move {
            if let Err(e) = insert_event(&pool, &event).await {
                tracing::warn!(
                    error = %e,
                    event_type = %event.event_type,
                    tenant_id = %event.tenant_id,
                    entity_id = %event.entity_id,
                    "Failed to persist audit event"
                );
            }
        });
    }
}
