//! Reclaim Infrastructure Library
//!
//! Shared infrastructure used by the API binary and the pipeline services:
//! - Telemetry initialization
//! - Request ID middleware
//! - In-process rate limiting
//! - Tracing-backed audit sink

#[cfg(feature = "middleware")]
pub mod middleware;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

pub mod audit;

// Re-export commonly used types
#[cfg(feature = "middleware")]
pub use middleware::{request_id_middleware, RequestId, REQUEST_ID_HEADER};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};

#[cfg(feature = "rate-limit")]
pub use rate_limit::InMemoryRateLimiter;

pub use audit::TracingAuditSink;
