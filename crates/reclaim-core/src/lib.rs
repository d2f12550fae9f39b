//! Reclaim Core Library
//!
//! This crate provides the domain models, error types, configuration and the
//! collaborator traits (quota, audit, rate limiting, time) shared by every
//! Reclaim component.

pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hooks;
pub mod models;
pub mod rate_limit;
pub mod storage_types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BaseConfig, Config, PipelineConfig, RateLimitBackend};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use fingerprint::ContentFingerprint;
pub use hooks::{
    AuditEvent, AuditEventType, AuditSink, NoopAuditSink, QuotaDecision, QuotaGate,
    UnlimitedQuota,
};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use storage_types::StorageBackend;
