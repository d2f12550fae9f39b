use crate::error::{ErrorResponse, HttpAppError, OptionalJson};
use crate::state::AppState;
use axum::{extract::State, Json};
use reclaim_services::{ReapOutcome, ReapParams};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReapBody {
    /// Age in minutes after which a pending receipt counts as stuck (default 15, max 1440)
    #[serde(default, alias = "thresholdMinutes")]
    pub threshold_minutes: Option<i64>,
    /// Maximum receipts to re-dispatch (default 10, max 50)
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReapResponse {
    /// `noop` when nothing was stale, otherwise `swept`
    pub status: String,
    pub retried: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[utoipa::path(
    post,
    path = "/api/v0/internal/reaper",
    tag = "internal",
    request_body(content = Option<ReapBody>, content_type = "application/json"),
    responses(
        (status = 200, description = "Sweep finished", body = ReapResponse),
        (status = 401, description = "Missing or invalid worker secret", body = ErrorResponse),
        (status = 500, description = "Stale receipts could not be listed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, body), fields(operation = "reap_stuck_receipts"))]
pub async fn reap_stuck_receipts(
    State(state): State<Arc<AppState>>,
    OptionalJson(body): OptionalJson<ReapBody>,
) -> Result<Json<ReapResponse>, HttpAppError> {
    let params = ReapParams::new(body.threshold_minutes, body.limit);
    let outcome = state.reaper.reap(params).await?;
    let report = outcome.report();

    Ok(Json(ReapResponse {
        status: match outcome {
            ReapOutcome::NothingToReap => "noop",
            ReapOutcome::Swept(_) => "swept",
        }
        .to_string(),
        retried: report.retried,
        succeeded: report.succeeded,
        failed: report.failed,
    }))
}
