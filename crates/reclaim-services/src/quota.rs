use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use reclaim_core::{Clock, QuotaDecision, QuotaGate};
use reclaim_db::ReceiptRepository;
use uuid::Uuid;

/// Monthly receipt allowance per tenant, counted from the start of the current
/// UTC month. A limit of 0 disables the check.
pub struct MonthlyReceiptQuota {
    receipts: Arc<dyn ReceiptRepository>,
    clock: Arc<dyn Clock>,
    limit: i64,
}

impl MonthlyReceiptQuota {
    pub fn new(receipts: Arc<dyn ReceiptRepository>, clock: Arc<dyn Clock>, limit: i64) -> Self {
        Self {
            receipts,
            clock,
            limit,
        }
    }
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[async_trait]
impl QuotaGate for MonthlyReceiptQuota {
    async fn check_upload(&self, tenant_id: Uuid) -> Result<QuotaDecision, anyhow::Error> {
        if self.limit <= 0 {
            return Ok(QuotaDecision::unlimited(0));
        }

        let used = self
            .receipts
            .count_created_since(tenant_id, month_start(self.clock.now()))
            .await?;

        Ok(QuotaDecision {
            allowed: used < self.limit,
            used,
            limit: self.limit,
        })
    }
}
