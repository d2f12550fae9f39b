//! `AppError` is what every receipt-pipeline failure ends up as. Service
//! errors (ingest, dispatch, warranty, reaper) convert into it, and
//! `ErrorMetadata` decides status, code and log level from there.
//!
//! `Database` wraps `sqlx::Error` only with the `sqlx` feature.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Validation failures and other caller mistakes
    Debug,
    /// Expected outcomes such as duplicates
    Info,
    /// Plan limits
    Warn,
    Error,
}

/// How an error presents itself over HTTP and in the log.
pub trait ErrorMetadata {
    fn http_status_code(&self) -> u16;

    /// Stable snake_case code, e.g. `duplicate`.
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same request can succeed.
    fn is_recoverable(&self) -> bool;

    fn suggested_action(&self) -> Option<&'static str>;

    /// Message safe to show the caller.
    fn client_message(&self) -> String;

    /// Sensitive errors never expose their details.
    fn is_sensitive(&self) -> bool;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Plan limit reached: {used}/{limit}")]
    PlanLimitReached { used: i64, limit: i64 },

    #[error("Duplicate of receipt {existing_id} ({existing_status})")]
    Duplicate {
        existing_id: Uuid,
        existing_status: String,
        existing_created_at: DateTime<Utc>,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Warranty lookup already in progress: {0}")]
    LookupInProgress(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Dependency failed: {0}")]
    Dependency(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

/// How a variant is presented to callers and to the log.
struct Presentation {
    status: u16,
    code: &'static str,
    recoverable: bool,
    action: Option<&'static str>,
    sensitive: bool,
    level: LogLevel,
}

const RETRY_LATER: Option<&str> = Some("Retry after a short delay");

impl Presentation {
    const fn client(status: u16, code: &'static str, action: &'static str, level: LogLevel) -> Self {
        Presentation {
            status,
            code,
            recoverable: false,
            action: Some(action),
            sensitive: false,
            level,
        }
    }

    const fn server(status: u16, code: &'static str, action: Option<&'static str>) -> Self {
        Presentation {
            status,
            code,
            recoverable: true,
            action,
            sensitive: true,
            level: LogLevel::Error,
        }
    }

    const fn retryable(mut self) -> Self {
        self.recoverable = true;
        self
    }
}

impl AppError {
    fn presentation(&self) -> Presentation {
        match self {
            AppError::Database(_) | AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                Presentation::server(500, "internal_error", RETRY_LATER)
            }
            AppError::Storage(_) => Presentation::server(
                502,
                "storage_failed",
                Some("Retry the upload after a short delay"),
            ),
            AppError::Dependency(_) => Presentation::server(502, "dependency_failed", RETRY_LATER),
            AppError::InvalidInput(_) => Presentation::client(
                400,
                "invalid_input",
                "Check request parameters and try again",
                LogLevel::Debug,
            ),
            AppError::UnsupportedType(_) => Presentation::client(
                415,
                "unsupported_type",
                "Upload a JPEG, PNG, WebP, HEIC or PDF receipt",
                LogLevel::Debug,
            ),
            AppError::PayloadTooLarge { .. } => Presentation::client(
                413,
                "too_large",
                "Reduce file size and try again",
                LogLevel::Debug,
            ),
            AppError::PlanLimitReached { .. } => Presentation::client(
                402,
                "plan_limit_reached",
                "Upgrade plan or wait for the limit to reset",
                LogLevel::Warn,
            ),
            AppError::Duplicate { .. } => Presentation::client(
                409,
                "duplicate",
                "Open the existing receipt instead of uploading again",
                LogLevel::Info,
            ),
            AppError::Conflict(_) => {
                Presentation::client(409, "conflict", "Try again", LogLevel::Info).retryable()
            }
            AppError::LookupInProgress(_) => Presentation::client(
                409,
                "lookup_in_progress",
                "Wait a few seconds and check again",
                LogLevel::Info,
            )
            .retryable(),
            AppError::PreconditionFailed(_) => Presentation::client(
                422,
                "precondition_failed",
                "Fix the receipt details and try again",
                LogLevel::Debug,
            ),
            AppError::NotFound(_) => Presentation::client(
                404,
                "not_found",
                "Verify the resource ID exists",
                LogLevel::Debug,
            ),
            AppError::Unauthorized(_) => Presentation::client(
                401,
                "unauthorized",
                "Check the credentials sent with the request",
                LogLevel::Debug,
            ),
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::UnsupportedType(_) => "UnsupportedType",
            AppError::PayloadTooLarge { .. } => "PayloadTooLarge",
            AppError::PlanLimitReached { .. } => "PlanLimitReached",
            AppError::Duplicate { .. } => "Duplicate",
            AppError::Conflict(_) => "Conflict",
            AppError::LookupInProgress(_) => "LookupInProgress",
            AppError::PreconditionFailed(_) => "PreconditionFailed",
            AppError::NotFound(_) => "NotFound",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Dependency(_) => "Dependency",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Structured context a client needs to act on the error
    /// (usage counters for plan limits, the original record for duplicates).
    pub fn context(&self) -> Option<serde_json::Value> {
        match self {
            AppError::PayloadTooLarge { size, limit } => Some(serde_json::json!({
                "size": size,
                "limit": limit,
            })),
            AppError::PlanLimitReached { used, limit } => Some(serde_json::json!({
                "used": used,
                "limit": limit,
            })),
            AppError::Duplicate {
                existing_id,
                existing_status,
                existing_created_at,
            } => Some(serde_json::json!({
                "existing_id": existing_id,
                "existing_status": existing_status,
                "existing_created_at": existing_created_at,
            })),
            _ => None,
        }
    }

    /// Display text followed by up to five causes.
    pub fn detailed_message(&self) -> String {
        let mut details = self.to_string();
        let mut causes = std::iter::successors(std::error::Error::source(self), |e| (*e).source());
        for cause in causes.by_ref().take(5) {
            details.push_str(&format!("\n  caused by: {}", cause));
        }
        if causes.next().is_some() {
            details.push_str("\n  ...");
        }
        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        self.presentation().status
    }

    fn error_code(&self) -> &'static str {
        self.presentation().code
    }

    fn is_recoverable(&self) -> bool {
        self.presentation().recoverable
    }

    fn suggested_action(&self) -> Option<&'static str> {
        self.presentation().action
    }

    fn is_sensitive(&self) -> bool {
        self.presentation().sensitive
    }

    fn log_level(&self) -> LogLevel {
        self.presentation().level
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to store the uploaded file".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::UnsupportedType(ref msg) => msg.clone(),
            AppError::PayloadTooLarge { size, limit } => format!(
                "File is {} bytes; the maximum allowed size is {} bytes",
                size, limit
            ),
            AppError::PlanLimitReached { used, limit } => format!(
                "Receipt upload limit reached ({}/{}) for the current plan",
                used, limit
            ),
            AppError::Duplicate { existing_id, .. } => format!(
                "This receipt has already been uploaded as {}",
                existing_id
            ),
            AppError::Conflict(ref msg) => msg.clone(),
            AppError::LookupInProgress(ref msg) => msg.clone(),
            AppError::PreconditionFailed(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::Dependency(_) => "An upstream service failed".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "internal_error");
        assert!(err.is_recoverable());
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
        assert_eq!(err.client_message(), "Failed to access database");
    }

    #[test]
    fn test_ingest_error_codes() {
        assert_eq!(
            AppError::UnsupportedType("x".into()).error_code(),
            "unsupported_type"
        );
        assert_eq!(
            AppError::PayloadTooLarge { size: 2, limit: 1 }.error_code(),
            "too_large"
        );
        assert_eq!(
            AppError::PlanLimitReached { used: 5, limit: 5 }.error_code(),
            "plan_limit_reached"
        );
        assert_eq!(AppError::Storage("s3 down".into()).error_code(), "storage_failed");
        assert_eq!(AppError::Internal("boom".into()).error_code(), "internal_error");
    }

    #[test]
    fn test_plan_limit_context_carries_counters() {
        let err = AppError::PlanLimitReached { used: 50, limit: 50 };
        assert_eq!(err.http_status_code(), 402);
        let ctx = err.context().unwrap();
        assert_eq!(ctx["used"], 50);
        assert_eq!(ctx["limit"], 50);
    }

    #[test]
    fn test_duplicate_context_references_original() {
        let existing_id = Uuid::new_v4();
        let created_at = Utc::now();
        let err = AppError::Duplicate {
            existing_id,
            existing_status: "pending".to_string(),
            existing_created_at: created_at,
        };
        assert_eq!(err.http_status_code(), 409);
        assert_eq!(err.error_code(), "duplicate");
        let ctx = err.context().unwrap();
        assert_eq!(ctx["existing_id"], existing_id.to_string());
        assert_eq!(ctx["existing_status"], "pending");
        assert!(err.client_message().contains(&existing_id.to_string()));
    }

    #[test]
    fn test_conflict_is_distinct_from_internal() {
        let err = AppError::Conflict("unique constraint".into());
        assert_eq!(err.http_status_code(), 409);
        assert!(err.is_recoverable());
        assert!(err.context().is_none());
    }

    #[test]
    fn test_internal_with_source_chain() {
        let err = AppError::from(anyhow::anyhow!("root cause"));
        assert_eq!(err.error_type(), "Internal");
        assert_eq!(err.client_message(), "Internal server error");
        assert!(err.detailed_message().contains("Internal error with source"));
    }
}
