use crate::StorageBackend;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("receipt upload failed: {0}")]
    UploadFailed(String),

    #[error("receipt delete failed: {0}")]
    DeleteFailed(String),

    #[error("no stored receipt at {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage backend error: {0}")]
    BackendError(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("storage misconfigured: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Blob store holding original receipt documents.
///
/// Receipts are written once, never modified, and read back by clients
/// through short-lived signed URLs. Every key handed out by `upload` is
/// tenant-scoped (see the crate docs).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under the tenant's prefix. Returns `(storage_key, storage_url)`.
    async fn upload(
        &self,
        tenant_id: Uuid,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)>;

    /// Deleting a key that no longer exists is not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Time-limited read URL for a stored receipt.
    async fn get_presigned_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    fn backend_type(&self) -> StorageBackend;
}
