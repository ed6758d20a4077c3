use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{BlobStore, BlobStoreError};

/// Bounds every backend call so a slow provider cannot hold a request open.
pub struct TimeoutStore<S> {
    inner: S,
    limit: Duration,
}

impl<S: BlobStore> TimeoutStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, BlobStoreError>>,
    ) -> Result<T, BlobStoreError> {
        tokio::time::timeout(self.limit, call)
            .await
            .map_err(|_| BlobStoreError::Timeout(self.limit))?
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for TimeoutStore<S> {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), BlobStoreError> {
        self.bounded(self.inner.put(key, data, content_type)).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        self.bounded(self.inner.get(key)).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.bounded(self.inner.delete(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        self.bounded(self.inner.exists(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledStore;

    #[async_trait]
    impl BlobStore for StalledStore {
        async fn put(&self, _: &str, _: Bytes, _: &str) -> Result<(), BlobStoreError> {
            std::future::pending().await
        }

        async fn get(&self, _: &str) -> Result<Bytes, BlobStoreError> {
            std::future::pending().await
        }

        async fn delete(&self, _: &str) -> Result<(), BlobStoreError> {
            Ok(())
        }

        async fn exists(&self, _: &str) -> Result<bool, BlobStoreError> {
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out() {
        let store = TimeoutStore::new(StalledStore, Duration::from_secs(30));

        let err = store.get("slow.jpg").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::Timeout(d) if d == Duration::from_secs(30)));

        let err = store
            .put("slow.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let store = TimeoutStore::new(StalledStore, Duration::from_secs(30));
        assert!(store.exists("any").await.unwrap());
        store.delete("any").await.unwrap();
    }
}
