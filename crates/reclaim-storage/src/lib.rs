//! Reclaim Storage Library
//!
//! Blob storage for uploaded receipt documents, with S3 and local filesystem
//! backends behind the `Storage` trait.
//!
//! # Storage key format
//!
//! Keys are tenant-scoped and identical across backends:
//! `receipts/{tenant_id}/{filename}`. Keys must not contain `..` or a leading `/`.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use reclaim_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
