//! API constants

/// API version segment used in every versioned route.
pub const API_VERSION: &str = "v0";

/// Versioned route prefix, e.g. `/api/v0/receipts`.
pub const API_PREFIX: &str = "/api/v0";

/// Trusted headers set by the upstream authentication layer.
pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Slack added on top of the receipt size limit for multipart framing and form fields.
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;
