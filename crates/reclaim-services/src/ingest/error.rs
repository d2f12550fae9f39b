use chrono::{DateTime, Utc};
use reclaim_core::models::ReceiptStatus;
use reclaim_core::{AppError, ErrorMetadata, LogLevel};
use reclaim_storage::StorageError;
use uuid::Uuid;

/// Why an upload was refused. Every variant except `Internal` is raised before
/// any record exists, so the caller can surface it as-is.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Unsupported receipt format: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("Plan limit reached: {used}/{limit}")]
    PlanLimitReached { used: i64, limit: i64 },

    #[error("Duplicate of receipt {existing_id}")]
    Duplicate {
        existing_id: Uuid,
        existing_status: ReceiptStatus,
        existing_created_at: DateTime<Utc>,
    },

    #[error("Concurrent upload conflict: {0}")]
    Conflict(String),

    #[error("Failed to store receipt file: {0}")]
    StorageFailed(#[source] StorageError),

    #[error("Ingest failed: {0}")]
    Internal(#[source] anyhow::Error),
}

impl IngestError {
    pub fn duplicate_of(record: &reclaim_core::models::ReceiptRecord) -> Self {
        IngestError::Duplicate {
            existing_id: record.id,
            existing_status: record.status,
            existing_created_at: record.created_at,
        }
    }
}

impl ErrorMetadata for IngestError {
    fn http_status_code(&self) -> u16 {
        match self {
            IngestError::UnsupportedType(_) => 415,
            IngestError::TooLarge { .. } => 413,
            IngestError::PlanLimitReached { .. } => 402,
            IngestError::Duplicate { .. } | IngestError::Conflict(_) => 409,
            IngestError::StorageFailed(_) => 502,
            IngestError::Internal(_) => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            IngestError::UnsupportedType(_) => "unsupported_type",
            IngestError::TooLarge { .. } => "too_large",
            IngestError::PlanLimitReached { .. } => "plan_limit_reached",
            IngestError::Duplicate { .. } => "duplicate",
            IngestError::Conflict(_) => "conflict",
            IngestError::StorageFailed(_) => "storage_failed",
            IngestError::Internal(_) => "internal_error",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::Conflict(_) | IngestError::StorageFailed(_) | IngestError::Internal(_)
        )
    }

    fn suggested_action(&self) -> Option<&'static str> {
        match self {
            IngestError::UnsupportedType(_) => Some("Upload a JPEG, PNG, WebP, HEIC or PDF receipt"),
            IngestError::TooLarge { .. } => Some("Reduce file size and try again"),
            IngestError::PlanLimitReached { .. } => {
                Some("Upgrade plan or wait for the limit to reset")
            }
            IngestError::Duplicate { .. } => {
                Some("Open the existing receipt instead of uploading again")
            }
            IngestError::Conflict(_) => Some("Try again"),
            IngestError::StorageFailed(_) => Some("Retry the upload after a short delay"),
            IngestError::Internal(_) => Some("Retry after a short delay"),
        }
    }

    fn client_message(&self) -> String {
        match self {
            IngestError::UnsupportedType(msg) => msg.clone(),
            IngestError::TooLarge { size, limit } => format!(
                "File is {} bytes; the maximum allowed size is {} bytes",
                size, limit
            ),
            IngestError::PlanLimitReached { used, limit } => format!(
                "Receipt upload limit reached ({}/{}) for the current plan",
                used, limit
            ),
            IngestError::Duplicate { existing_id, .. } => format!(
                "This receipt has already been uploaded as {}",
                existing_id
            ),
            IngestError::Conflict(_) => {
                "Another upload of this receipt is in progress".to_string()
            }
            IngestError::StorageFailed(_) => "Failed to store the uploaded file".to_string(),
            IngestError::Internal(_) => "Internal server error".to_string(),
        }
    }

    fn is_sensitive(&self) -> bool {
        matches!(
            self,
            IngestError::StorageFailed(_) | IngestError::Internal(_)
        )
    }

    fn log_level(&self) -> LogLevel {
        match self {
            IngestError::UnsupportedType(_) | IngestError::TooLarge { .. } => LogLevel::Debug,
            IngestError::Duplicate { .. } | IngestError::Conflict(_) => LogLevel::Info,
            IngestError::PlanLimitReached { .. } => LogLevel::Warn,
            IngestError::StorageFailed(_) | IngestError::Internal(_) => LogLevel::Error,
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::UnsupportedType(msg) => AppError::UnsupportedType(msg),
            IngestError::TooLarge { size, limit } => AppError::PayloadTooLarge { size, limit },
            IngestError::PlanLimitReached { used, limit } => {
                AppError::PlanLimitReached { used, limit }
            }
            IngestError::Duplicate {
                existing_id,
                existing_status,
                existing_created_at,
            } => AppError::Duplicate {
                existing_id,
                existing_status: existing_status.to_string(),
                existing_created_at,
            },
            IngestError::Conflict(msg) => AppError::Conflict(msg),
            IngestError::StorageFailed(e) => AppError::Storage(e.to_string()),
            IngestError::Internal(e) => AppError::InternalWithSource {
                message: "Receipt ingest failed".to_string(),
                source: e,
            },
        }
    }
}
