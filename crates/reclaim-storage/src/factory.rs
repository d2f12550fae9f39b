#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use reclaim_core::Config;
use std::sync::Arc;

fn required(value: Option<&str>, var: &str) -> StorageResult<String> {
    value
        .map(str::to_string)
        .ok_or_else(|| StorageError::ConfigError(format!("{} not configured", var)))
}

/// Build the receipt blob store selected by `STORAGE_BACKEND` (local by default).
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let backend = config.storage_backend().unwrap_or(StorageBackend::Local);
    tracing::debug!(backend = %backend, "Selecting receipt storage backend");

    match backend {
        StorageBackend::S3 => s3_backend(config).await,
        StorageBackend::Local => local_backend(config).await,
    }
}

#[cfg(feature = "storage-s3")]
async fn s3_backend(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let bucket = required(config.s3_bucket(), "S3_BUCKET")?;
    let region = required(config.s3_region(), "S3_REGION or AWS_REGION")?;
    let endpoint = config.s3_endpoint().map(str::to_string);
    Ok(Arc::new(S3Storage::new(bucket, region, endpoint).await?))
}

#[cfg(not(feature = "storage-s3"))]
async fn s3_backend(_config: &Config) -> StorageResult<Arc<dyn Storage>> {
    Err(StorageError::ConfigError(
        "this build has no S3 support (enable the storage-s3 feature)".to_string(),
    ))
}

#[cfg(feature = "storage-local")]
async fn local_backend(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let root = required(config.local_storage_path(), "LOCAL_STORAGE_PATH")?;
    let base_url = required(config.local_storage_base_url(), "LOCAL_STORAGE_BASE_URL")?;
    Ok(Arc::new(LocalStorage::new(root, base_url).await?))
}

#[cfg(not(feature = "storage-local"))]
async fn local_backend(_config: &Config) -> StorageResult<Arc<dyn Storage>> {
    Err(StorageError::ConfigError(
        "this build has no local storage support (enable the storage-local feature)".to_string(),
    ))
}
