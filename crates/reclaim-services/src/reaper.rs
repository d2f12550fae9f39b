//! Stuck-job reaper
//!
//! Finds receipts that never left `pending` and re-dispatches them. One
//! invocation is one bounded sweep: no retries inside a sweep, and only
//! receipts that are stale at call time are selected. Meant to be called on a
//! fixed cadence, either by an external scheduler or by [`StuckJobReaper::start`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reclaim_core::{AuditEvent, AuditEventType, AuditSink, Clock};
use reclaim_db::ReceiptRepository;
use serde::Serialize;
use tokio::time::interval;

use crate::dispatch::{DispatchOutcome, ExtractionDispatcher};

pub const DEFAULT_THRESHOLD_MINUTES: i64 = 15;
pub const MAX_THRESHOLD_MINUTES: i64 = 1440;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 50;

/// Sweep parameters, always within bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapParams {
    threshold_minutes: i64,
    limit: i64,
}

impl ReapParams {
    /// Missing values take the defaults; out-of-range values are clamped to
    /// `1..=1440` minutes and `1..=50` receipts.
    pub fn new(threshold_minutes: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            threshold_minutes: threshold_minutes
                .unwrap_or(DEFAULT_THRESHOLD_MINUTES)
                .clamp(1, MAX_THRESHOLD_MINUTES),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn threshold_minutes(&self) -> i64 {
        self.threshold_minutes
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }
}

impl Default for ReapParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub retried: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// No receipt was stale.
    NothingToReap,
    /// At least one receipt was re-dispatched.
    Swept(ReapReport),
}

impl ReapOutcome {
    pub fn report(&self) -> ReapReport {
        match self {
            ReapOutcome::NothingToReap => ReapReport::default(),
            ReapOutcome::Swept(report) => *report,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReapError {
    #[error("Failed to list stale receipts: {0}")]
    Store(#[source] anyhow::Error),
}

#[derive(Clone)]
pub struct StuckJobReaper {
    receipts: Arc<dyn ReceiptRepository>,
    dispatcher: Arc<ExtractionDispatcher>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl StuckJobReaper {
    pub fn new(
        receipts: Arc<dyn ReceiptRepository>,
        dispatcher: Arc<ExtractionDispatcher>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            receipts,
            dispatcher,
            audit,
            clock,
        }
    }

    /// Run one sweep. Per-receipt failures are counted, never propagated.
    #[tracing::instrument(skip(self), fields(threshold_minutes = params.threshold_minutes(), limit = params.limit()))]
    pub async fn reap(&self, params: ReapParams) -> Result<ReapOutcome, ReapError> {
        let cutoff = self.clock.now() - chrono::Duration::minutes(params.threshold_minutes());

        let stale = self
            .receipts
            .list_stale_pending(cutoff, params.limit())
            .await
            .map_err(ReapError::Store)?;

        if stale.is_empty() {
            tracing::debug!("No stale pending receipts");
            return Ok(ReapOutcome::NothingToReap);
        }

        let results = join_all(stale.iter().map(|record| self.dispatcher.dispatch(record))).await;

        let mut report = ReapReport {
            retried: stale.len(),
            ..ReapReport::default()
        };

        for (record, result) in stale.iter().zip(results) {
            match result {
                Ok(DispatchOutcome::Accepted) => {
                    report.succeeded += 1;
                    self.audit.record(
                        AuditEvent::new(
                            record.tenant_id,
                            "receipt",
                            record.id,
                            AuditEventType::ReceiptRedispatched,
                            self.clock.now(),
                        )
                        .with_after(serde_json::json!({
                            "status": record.status,
                            "age_minutes": (self.clock.now() - record.created_at).num_minutes(),
                        })),
                    );
                }
                Ok(DispatchOutcome::FellBackToReview { reason, .. }) => {
                    report.failed += 1;
                    tracing::warn!(receipt_id = %record.id, reason = %reason, "Re-dispatch failed");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(receipt_id = %record.id, error = %e, "Re-dispatch failed");
                }
            }
        }

        tracing::info!(
            retried = report.retried,
            succeeded = report.succeeded,
            failed = report.failed,
            "Reaper sweep completed"
        );

        Ok(ReapOutcome::Swept(report))
    }

    /// Sweep every `every` with fixed parameters until the handle is aborted.
    /// The first sweep runs immediately.
    pub fn start(self: Arc<Self>, every: Duration, params: ReapParams) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut reap_interval = interval(every);

            loop {
                reap_interval.tick().await;

                match self.reap(params).await {
                    Ok(ReapOutcome::NothingToReap) => {}
                    Ok(ReapOutcome::Swept(report)) => {
                        tracing::info!(
                            retried = report.retried,
                            succeeded = report.succeeded,
                            failed = report.failed,
                            "Scheduled reaper sweep finished"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Scheduled reaper sweep failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_receipt, InMemoryReceiptRepository, RecordingAuditSink, StubWorker};
    use chrono::Utc;
    use reclaim_core::models::{ReceiptRecord, ReceiptStatus};
    use reclaim_core::ManualClock;
    use uuid::Uuid;

    struct Harness {
        reaper: StuckJobReaper,
        repo: Arc<InMemoryReceiptRepository>,
        worker: Arc<StubWorker>,
        clock: Arc<ManualClock>,
        audit: Arc<RecordingAuditSink>,
    }

    fn harness() -> Harness {
        let repo = Arc::new(InMemoryReceiptRepository::new());
        let worker = Arc::new(StubWorker::accepting());
        let audit = Arc::new(RecordingAuditSink::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = Arc::new(ExtractionDispatcher::new(
            worker.clone(),
            repo.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let reaper = StuckJobReaper::new(repo.clone(), dispatcher, audit.clone(), clock.clone());
        Harness {
            reaper,
            repo,
            worker,
            clock,
            audit,
        }
    }

    fn pending_aged(h: &Harness, minutes: i64) -> ReceiptRecord {
        let mut record = sample_receipt(Uuid::new_v4(), Uuid::new_v4().as_bytes());
        record.created_at = h.clock.now() - chrono::Duration::minutes(minutes);
        h.repo.insert(record.clone());
        record
    }

    #[test]
    fn test_params_are_clamped() {
        let defaults = ReapParams::new(None, None);
        assert_eq!(defaults.threshold_minutes(), 15);
        assert_eq!(defaults.limit(), 10);

        let high = ReapParams::new(Some(10_000), Some(500));
        assert_eq!(high.threshold_minutes(), 1440);
        assert_eq!(high.limit(), 50);

        let low = ReapParams::new(Some(-5), Some(0));
        assert_eq!(low.threshold_minutes(), 1);
        assert_eq!(low.limit(), 1);
    }

    #[tokio::test]
    async fn test_nothing_stale_is_distinct_noop() {
        let h = harness();
        pending_aged(&h, 2);

        let outcome = h.reaper.reap(ReapParams::new(Some(15), Some(10))).await.unwrap();

        assert_eq!(outcome, ReapOutcome::NothingToReap);
        assert_eq!(outcome.report(), ReapReport::default());
        assert!(h.worker.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let h = harness();
        let a = pending_aged(&h, 20);
        let b = pending_aged(&h, 30);
        let c = pending_aged(&h, 40);
        h.worker.fail_for(b.id);

        let outcome = h.reaper.reap(ReapParams::new(Some(15), Some(10))).await.unwrap();

        assert_eq!(
            outcome,
            ReapOutcome::Swept(ReapReport {
                retried: 3,
                succeeded: 2,
                failed: 1
            })
        );
        assert_eq!(
            h.repo.get(b.tenant_id, b.id).unwrap().status,
            ReceiptStatus::InReview
        );
        assert_eq!(
            h.repo.get(a.tenant_id, a.id).unwrap().status,
            ReceiptStatus::Pending
        );
        assert_eq!(
            h.repo.get(c.tenant_id, c.id).unwrap().status,
            ReceiptStatus::Pending
        );
        let redispatched = h
            .audit
            .event_types()
            .into_iter()
            .filter(|t| *t == AuditEventType::ReceiptRedispatched)
            .count();
        assert_eq!(redispatched, 2);
    }

    #[tokio::test]
    async fn test_limit_selects_oldest_first() {
        let h = harness();
        let mut oldest = Vec::new();
        for age in [100, 90, 80] {
            oldest.push(pending_aged(&h, age).id);
        }
        for age in [70, 60, 50] {
            pending_aged(&h, age);
        }

        let outcome = h.reaper.reap(ReapParams::new(Some(15), Some(3))).await.unwrap();

        assert_eq!(outcome.report().retried, 3);
        let mut sent: Vec<Uuid> = h.worker.submissions().iter().map(|p| p.record_id).collect();
        sent.sort();
        oldest.sort();
        assert_eq!(sent, oldest);
    }

    #[tokio::test]
    async fn test_young_and_advanced_receipts_are_skipped() {
        let h = harness();
        pending_aged(&h, 10);
        let mut done = pending_aged(&h, 60);
        done.status = ReceiptStatus::Complete;
        h.repo.insert(done);

        let outcome = h.reaper.reap(ReapParams::new(Some(15), Some(10))).await.unwrap();
        assert_eq!(outcome, ReapOutcome::NothingToReap);
    }

    #[tokio::test]
    async fn test_receipt_becomes_stale_as_clock_advances() {
        let h = harness();
        pending_aged(&h, 5);

        assert_eq!(
            h.reaper.reap(ReapParams::default()).await.unwrap(),
            ReapOutcome::NothingToReap
        );

        h.clock.advance(chrono::Duration::minutes(11));
        let outcome = h.reaper.reap(ReapParams::default()).await.unwrap();
        assert_eq!(outcome.report().retried, 1);
        assert_eq!(outcome.report().succeeded, 1);
    }

    #[tokio::test]
    async fn test_scheduled_sweeps_redispatch_stale_receipts() {
        let h = harness();
        let stale = pending_aged(&h, 30);
        let worker = h.worker.clone();
        let reaper = Arc::new(h.reaper);

        let handle = reaper.start(Duration::from_millis(20), ReapParams::default());

        let sent = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(payload) = worker.submissions().first().cloned() {
                    return payload;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("scheduled sweep never dispatched");
        handle.abort();

        assert_eq!(sent.record_id, stale.id);
    }
}
