use crate::auth::TenantContext;
use crate::error::{ErrorResponse, HttpAppError, OptionalJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use reclaim_core::models::LineItem;
use reclaim_services::WarrantyCheckRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WarrantyCheckBody {
    /// Bypass the 30-day result cache
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WarrantyCheckResponse {
    pub item: LineItem,
    /// True when the stored result was served without a new lookup
    pub cached: bool,
    pub warranty_found: bool,
}

#[utoipa::path(
    post,
    path = "/api/v0/receipts/{receipt_id}/items/{item_id}/warranty",
    tag = "warranty",
    params(
        ("receipt_id" = Uuid, Path, description = "Receipt ID"),
        ("item_id" = Uuid, Path, description = "Line item ID")
    ),
    request_body(content = Option<WarrantyCheckBody>, content_type = "application/json"),
    responses(
        (status = 200, description = "Warranty check result", body = WarrantyCheckResponse),
        (status = 401, description = "Missing tenant context", body = ErrorResponse),
        (status = 404, description = "Receipt or line item not found", body = ErrorResponse),
        (status = 409, description = "Lookup already in progress", body = ErrorResponse),
        (status = 422, description = "Receipt has no purchase date", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, body),
    fields(
        tenant_id = %tenant_ctx.tenant_id,
        receipt_id = %receipt_id,
        item_id = %item_id,
        force = body.force,
        operation = "check_warranty"
    )
)]
pub async fn check_warranty(
    State(state): State<Arc<AppState>>,
    tenant_ctx: TenantContext,
    Path((receipt_id, item_id)): Path<(Uuid, Uuid)>,
    OptionalJson(body): OptionalJson<WarrantyCheckBody>,
) -> Result<Json<WarrantyCheckResponse>, HttpAppError> {
    let outcome = state
        .warranty
        .check(WarrantyCheckRequest {
            tenant_id: tenant_ctx.tenant_id,
            actor_id: Some(tenant_ctx.actor_id),
            receipt_id,
            item_id,
            force: body.force,
        })
        .await?;

    Ok(Json(WarrantyCheckResponse {
        item: outcome.item,
        cached: outcome.cached,
        warranty_found: outcome.warranty_found,
    }))
}
