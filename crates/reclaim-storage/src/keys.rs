//! Shared key generation for storage backends.

use uuid::Uuid;

/// Generate the storage key for a tenant's receipt file: `receipts/{tenant_id}/{filename}`.
pub fn generate_storage_key(tenant_id: Uuid, filename: &str) -> String {
    format!("receipts/{}/{}", tenant_id, filename)
}

/// Reject keys that could escape the storage root.
pub fn validate_key(storage_key: &str) -> bool {
    !storage_key.is_empty() && !storage_key.contains("..") && !storage_key.starts_with('/')
}
