use crate::auth::TenantContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reclaim_core::models::{EmailProvenance, ReceiptStatus, ReceiptSummary};
use reclaim_core::{AppError, AuditEvent, AuditEventType};
use reclaim_services::IngestRequest;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Fields read from an upload form.
#[derive(Debug)]
struct UploadForm {
    data: Option<Vec<u8>>,
    filename: Option<String>,
    content_type: Option<String>,
    provenance: EmailProvenance,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        data: None,
        filename: None,
        content_type: None,
        provenance: EmailProvenance {
            from: None,
            subject: None,
            message_id: None,
            received_at: None,
        },
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();

        match field_name.as_str() {
            "file" => {
                if form.data.is_some() {
                    return Err(AppError::InvalidInput(
                        "Multiple file fields are not allowed; send exactly one field named 'file'"
                            .to_string(),
                    ));
                }
                form.filename = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read file data: {}", e))
                })?;
                form.data = Some(data.to_vec());
            }
            "email_from" | "email_subject" | "email_message_id" | "email_received_at" => {
                let text = field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read field {}: {}", field_name, e))
                })?;
                let Some(value) = non_empty(text) else {
                    continue;
                };
                match field_name.as_str() {
                    "email_from" => form.provenance.from = Some(value),
                    "email_subject" => form.provenance.subject = Some(value),
                    "email_message_id" => form.provenance.message_id = Some(value),
                    _ => {
                        let received_at = DateTime::parse_from_rfc3339(&value).map_err(|_| {
                            AppError::InvalidInput(
                                "email_received_at must be an RFC 3339 timestamp".to_string(),
                            )
                        })?;
                        form.provenance.received_at = Some(received_at.with_timezone(&Utc));
                    }
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

#[utoipa::path(
    post,
    path = "/api/v0/receipts",
    tag = "receipts",
    request_body(content = inline(Object), content_type = "multipart/form-data",
        description = "Field `file` holds the receipt; optional `email_from`, `email_subject`, `email_message_id` and `email_received_at` carry forwarding provenance"),
    responses(
        (status = 201, description = "Receipt accepted", body = ReceiptSummary),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Missing tenant context", body = ErrorResponse),
        (status = 402, description = "Plan limit reached", body = ErrorResponse),
        (status = 409, description = "Duplicate receipt", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 415, description = "Unsupported format", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, multipart),
    fields(tenant_id = %tenant_ctx.tenant_id, actor_id = %tenant_ctx.actor_id, operation = "upload_receipt")
)]
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    tenant_ctx: TenantContext,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let form = read_upload_form(multipart).await?;
    let data = form
        .data
        .ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;

    let outcome = state
        .receipts
        .gateway
        .ingest(IngestRequest {
            tenant_id: tenant_ctx.tenant_id,
            actor_id: tenant_ctx.actor_id,
            data,
            declared_content_type: form.content_type,
            original_filename: form.filename,
            email_provenance: Some(form.provenance),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(outcome.receipt)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReceiptResponse {
    pub id: Uuid,
    pub status: ReceiptStatus,
    pub content_type: String,
    pub file_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_provenance: Option<EmailProvenance>,
    /// Short-lived signed URL for the stored document
    pub download_url: String,
    pub download_url_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/v0/receipts/{id}",
    tag = "receipts",
    params(
        ("id" = Uuid, Path, description = "Receipt ID")
    ),
    responses(
        (status = 200, description = "Receipt found", body = ReceiptResponse),
        (status = 401, description = "Missing tenant context", body = ErrorResponse),
        (status = 404, description = "Receipt not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state),
    fields(tenant_id = %tenant_ctx.tenant_id, receipt_id = %id, operation = "get_receipt")
)]
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    tenant_ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ReceiptResponse>, HttpAppError> {
    let record = state
        .receipts
        .repository
        .get_receipt(tenant_ctx.tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Receipt not found".to_string()))?;

    let ttl = state.receipts.signed_url_ttl;
    let download_url = state
        .receipts
        .storage
        .get_presigned_url(&record.storage_key, ttl)
        .await?;
    let download_url_expires_at = state.clock.now()
        + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(0));

    Ok(Json(ReceiptResponse {
        id: record.id,
        status: record.status,
        email_provenance: record.provenance(),
        content_type: record.content_type,
        file_size: record.file_size,
        original_filename: record.original_filename,
        needs_review: record.needs_review,
        confidence_score: record.confidence_score,
        merchant: record.merchant,
        purchase_date: record.purchase_date,
        download_url,
        download_url_expires_at,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v0/receipts/{id}",
    tag = "receipts",
    params(
        ("id" = Uuid, Path, description = "Receipt ID")
    ),
    responses(
        (status = 204, description = "Receipt deleted"),
        (status = 401, description = "Missing tenant context", body = ErrorResponse),
        (status = 404, description = "Receipt not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state),
    fields(tenant_id = %tenant_ctx.tenant_id, receipt_id = %id, operation = "delete_receipt")
)]
pub async fn delete_receipt(
    State(state): State<Arc<AppState>>,
    tenant_ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HttpAppError> {
    let record = state
        .receipts
        .repository
        .delete_receipt(tenant_ctx.tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Receipt not found".to_string()))?;

    // The row is gone either way; a leftover blob is only logged.
    if let Err(e) = state.receipts.storage.delete(&record.storage_key).await {
        tracing::error!(
            error = %e,
            receipt_id = %id,
            storage_key = %record.storage_key,
            "Failed to delete receipt file from storage"
        );
    }

    state.audit.record(
        AuditEvent::new(
            tenant_ctx.tenant_id,
            "receipt",
            id,
            AuditEventType::ReceiptDeleted,
            state.clock.now(),
        )
        .with_actor(Some(tenant_ctx.actor_id))
        .with_before(serde_json::json!({
            "status": record.status,
            "storage_key": record.storage_key,
        })),
    );

    tracing::info!(receipt_id = %id, "Receipt deleted");
    Ok(StatusCode::NO_CONTENT)
}
