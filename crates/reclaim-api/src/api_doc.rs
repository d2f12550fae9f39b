//! OpenAPI documentation served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use reclaim_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Reclaim API",
        version = "0.1.0",
        description = "Receipt ingest and warranty tracking API (v0). Uploads are fingerprinted for duplicate detection, stored, and handed to the extraction worker; line items can be checked for warranty coverage. Tenant context arrives as X-Tenant-Id / X-Actor-Id headers from the upstream gateway."
    ),
    paths(
        // Receipts
        handlers::receipts::upload_receipt,
        handlers::receipts::get_receipt,
        handlers::receipts::delete_receipt,
        // Warranty
        handlers::warranty::check_warranty,
        // Internal
        handlers::reaper::reap_stuck_receipts,
    ),
    components(
        schemas(
            models::ReceiptSummary,
            models::ReceiptStatus,
            models::EmailProvenance,
            models::LineItem,
            models::WarrantyLookupStatus,
            models::WarrantySource,
            handlers::receipts::ReceiptResponse,
            handlers::warranty::WarrantyCheckBody,
            handlers::warranty::WarrantyCheckResponse,
            handlers::reaper::ReapBody,
            handlers::reaper::ReapResponse,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "receipts", description = "Receipt upload, retrieval and deletion"),
        (name = "warranty", description = "Warranty coverage checks for line items"),
        (name = "internal", description = "Scheduler-facing maintenance endpoints")
    )
)]
pub struct ApiDoc;
