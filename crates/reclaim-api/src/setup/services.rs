//! Service initialization and application state setup

use crate::state::{AppState, ReceiptState, SecurityConfig};
use anyhow::{Context, Result};
use reclaim_core::{
    AuditEvent, AuditSink, Clock, Config, QuotaGate, RateLimitBackend, RateLimiter, SystemClock,
    UnlimitedQuota,
};
use reclaim_db::{
    LineItemRepository, PgAuditSink, PgLineItemRepository, PgRateLimiter, PgReceiptRepository,
    PgWarrantyRepository, ReceiptRepository, WarrantyRepository,
};
use reclaim_infra::{InMemoryRateLimiter, TracingAuditSink};
use reclaim_services::{
    AiWarrantyResolver, AnthropicWarrantyProvider, ExtractionDispatcher, HeuristicWarrantyResolver,
    HttpExtractionWorker, IngestGateway, IngestSettings, MonthlyReceiptQuota, StuckJobReaper,
    WarrantyEngine, WarrantyResolver,
};
use reclaim_storage::Storage;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Persists audit events and mirrors them onto the `audit` log target.
struct PersistedAuditSink {
    db: PgAuditSink,
    log: TracingAuditSink,
}

impl AuditSink for PersistedAuditSink {
    fn record(&self, event: AuditEvent) {
        self.log.record(event.clone());
        self.db.record(event);
    }
}

/// Initialize all services and repositories, returning the application state
pub fn initialize_services(
    config: &Config,
    pool: PgPool,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let audit: Arc<dyn AuditSink> = Arc::new(PersistedAuditSink {
        db: PgAuditSink::new(pool.clone()),
        log: TracingAuditSink,
    });

    let receipts: Arc<dyn ReceiptRepository> = Arc::new(PgReceiptRepository::new(pool.clone()));
    let items: Arc<dyn LineItemRepository> = Arc::new(PgLineItemRepository::new(pool.clone()));
    let warranties: Arc<dyn WarrantyRepository> =
        Arc::new(PgWarrantyRepository::new(pool.clone()));

    let worker = HttpExtractionWorker::from_config(config)
        .context("Failed to build extraction worker client")?;
    let dispatcher = Arc::new(ExtractionDispatcher::new(
        Arc::new(worker),
        receipts.clone(),
        audit.clone(),
        clock.clone(),
    ));

    let quota: Arc<dyn QuotaGate> = if config.plan_receipt_limit() > 0 {
        Arc::new(MonthlyReceiptQuota::new(
            receipts.clone(),
            clock.clone(),
            config.plan_receipt_limit(),
        ))
    } else {
        Arc::new(UnlimitedQuota)
    };

    let gateway = Arc::new(IngestGateway::new(
        receipts.clone(),
        storage.clone(),
        quota,
        dispatcher.clone(),
        audit.clone(),
        clock.clone(),
        IngestSettings::from_config(config),
    ));

    let reaper = Arc::new(StuckJobReaper::new(
        receipts.clone(),
        dispatcher,
        audit.clone(),
        clock.clone(),
    ));

    let resolvers = warranty_resolvers(config, &pool, &clock)?;
    let warranty = Arc::new(WarrantyEngine::new(
        receipts.clone(),
        items,
        warranties,
        resolvers,
        audit.clone(),
        clock.clone(),
    ));

    tracing::info!(
        plan_receipt_limit = config.plan_receipt_limit(),
        rate_limit_backend = ?config.rate_limit_backend(),
        "Pipeline services initialized"
    );

    Ok(Arc::new(AppState {
        pool: Some(pool),
        receipts: ReceiptState {
            repository: receipts,
            storage,
            gateway,
            signed_url_ttl: Duration::from_secs(config.signed_url_ttl_secs()),
            max_receipt_size_bytes: config.max_receipt_size_bytes(),
        },
        warranty,
        reaper,
        audit,
        clock,
        security: SecurityConfig {
            internal_secret: config.extraction_worker_secret().to_string(),
            cors_origins: config.cors_origins().to_vec(),
        },
    }))
}

/// AI first (when configured), heuristics always last.
fn warranty_resolvers(
    config: &Config,
    pool: &PgPool,
    clock: &Arc<dyn Clock>,
) -> Result<Vec<Arc<dyn WarrantyResolver>>> {
    let mut resolvers: Vec<Arc<dyn WarrantyResolver>> = Vec::new();

    match (config.warranty_ai_enabled(), config.anthropic_api_key()) {
        (true, Some(api_key)) => {
            let provider = AnthropicWarrantyProvider::new(
                api_key,
                config.warranty_ai_model(),
                Duration::from_secs(config.warranty_ai_timeout_secs()),
            )
            .context("Failed to build warranty AI client")?;

            resolvers.push(Arc::new(AiWarrantyResolver::new(
                Arc::new(provider),
                setup_rate_limiter(config, pool, clock),
                config.warranty_ai_rate_limit_per_hour(),
            )));
            tracing::info!(
                model = %config.warranty_ai_model(),
                limit_per_hour = config.warranty_ai_rate_limit_per_hour(),
                "AI warranty lookup enabled"
            );
        }
        (true, None) => {
            tracing::warn!("WARRANTY_AI_ENABLED is set but ANTHROPIC_API_KEY is missing; using heuristics only");
        }
        (false, _) => {
            tracing::info!("AI warranty lookup disabled; using heuristics only");
        }
    }

    resolvers.push(Arc::new(
        HeuristicWarrantyResolver::new().context("Failed to build warranty heuristics")?,
    ));

    Ok(resolvers)
}

fn setup_rate_limiter(
    config: &Config,
    pool: &PgPool,
    clock: &Arc<dyn Clock>,
) -> Arc<dyn RateLimiter> {
    match config.rate_limit_backend() {
        RateLimitBackend::Memory => {
            let limiter = Arc::new(InMemoryRateLimiter::new(clock.clone()));
            limiter.clone().start_cleanup(RATE_LIMIT_CLEANUP_INTERVAL);
            limiter as Arc<dyn RateLimiter>
        }
        RateLimitBackend::Postgres => {
            let limiter = Arc::new(PgRateLimiter::new(pool.clone(), clock.clone()));
            let for_cleanup = limiter.clone();
            let clock = clock.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
                loop {
                    interval.tick().await;
                    // Hourly windows; anything older than two hours is dead.
                    let before = clock.now() - chrono::Duration::hours(2);
                    if let Err(e) = for_cleanup.delete_expired(before).await {
                        tracing::warn!(error = %e, "Failed to delete expired rate limit counters");
                    }
                }
            });
            limiter as Arc<dyn RateLimiter>
        }
    }
}
