use crate::keys::{generate_storage_key, validate_key};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Receipt documents on the local filesystem, for development and single-node
/// installs. Files are expected to be served statically under `base_url`.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub async fn new(root: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Cannot create receipt directory {}: {}",
                root.display(),
                e
            ))
        })?;
        // Canonical once, so containment checks compare like with like.
        let root = root.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Cannot resolve {}: {}", root.display(), e))
        })?;

        tracing::info!(root = %root.display(), "Local receipt storage ready");

        Ok(LocalStorage {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn resolve(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if !validate_key(storage_key) {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }
        let path = self.root.join(storage_key);
        match path.canonicalize() {
            Ok(real) if !real.starts_with(&self.root) => {
                Err(StorageError::InvalidKey(storage_key.to_string()))
            }
            _ => Ok(path),
        }
    }

    fn url_for(&self, storage_key: &str) -> String {
        format!("{}/{}", self.base_url, storage_key)
    }

    /// Write to a sibling temp file and rename, so readers never see a
    /// half-written receipt.
    async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let staging = path.with_extension(format!("partial-{}", Uuid::new_v4().simple()));

        let mut file = fs::File::create(&staging).await?;
        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        match written {
            Ok(()) => fs::rename(&staging, path).await,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        tenant_id: Uuid,
        filename: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)> {
        let key = generate_storage_key(tenant_id, filename);
        let path = self.resolve(&key)?;
        let started = Instant::now();

        Self::write_atomic(&path, &data).await.map_err(|e| {
            tracing::error!(error = %e, key = %key, "Local receipt write failed");
            StorageError::UploadFailed(format!("{}: {}", key, e))
        })?;

        tracing::debug!(
            key = %key,
            size_bytes = data.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Receipt stored on disk"
        );

        Ok((key.clone(), self.url_for(&key)))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.resolve(storage_key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key = %storage_key, "Receipt removed from disk");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!("{}: {}", storage_key, e))),
        }
    }

    // No signing on local disk; the TTL is ignored.
    async fn get_presigned_url(
        &self,
        storage_key: &str,
        _expires_in: Duration,
    ) -> StorageResult<String> {
        self.resolve(storage_key)?;
        Ok(self.url_for(storage_key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
