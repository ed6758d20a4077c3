mod gcs;
mod local;
mod timeout;

pub use gcs::GcsStore;
pub use local::LocalStore;
pub use timeout::TimeoutStore;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BlobStoreError {
    /// The key does not exist in the backend, as opposed to the backend failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobStoreError::NotFound(_))
    }
}

/// Byte storage behind a single flat key namespace.
/// Keys are `{asset_id}.{ext}`; the bytes mean nothing without the metadata row.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `key`, replacing anything already there.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), BlobStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError>;
    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;
}
