//! Shared test helpers for handler tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use tower::ServiceExt;

use crate::blob_store::{BlobStore, BlobStoreError, LocalStore};
use crate::config::{Config, NodeConfig, StorageConfig, UploadLimits};
use crate::storage::Database;
use crate::AppState;

pub const BOUNDARY: &str = "temple-assets-test-boundary";

/// Small ceilings so boundary tests stay cheap.
pub fn test_limits() -> UploadLimits {
    UploadLimits {
        image: 64 * 1024,
        logo: 16 * 1024,
        audio: 128 * 1024,
        document: 128 * 1024,
    }
}

pub fn test_config(temp_dir: &tempfile::TempDir) -> Config {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            ..StorageConfig::default()
        },
        limits: test_limits(),
        test_mode: true,
    }
}

/// Create a test AppState with a temporary database and local blob store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let config = test_config(temp_dir);
    let store = LocalStore::new(&config.storage.local_storage_path)
        .expect("Failed to create test blob store");
    test_state_with_store(temp_dir, Arc::new(store))
}

pub fn test_state_with_store(
    temp_dir: &tempfile::TempDir,
    blob_store: Arc<dyn BlobStore>,
) -> Arc<AppState> {
    test_state_with_parts(temp_dir, test_db(temp_dir), blob_store)
}

/// Open the test database on its own, for stores that need a handle to it.
pub fn test_db(temp_dir: &tempfile::TempDir) -> Database {
    let config = test_config(temp_dir);
    Database::open(&config.node.data_dir).expect("Failed to open test database")
}

pub fn test_state_with_parts(
    temp_dir: &tempfile::TempDir,
    db: Database,
    blob_store: Arc<dyn BlobStore>,
) -> Arc<AppState> {
    let config = test_config(temp_dir);

    Arc::new(AppState {
        config,
        db,
        blob_store,
    })
}

/// Local store whose operations can be switched to fail like an unreachable backend.
pub struct FlakyStore {
    inner: LocalStore,
    pub fail_put: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakyStore {
    pub fn new(temp_dir: &tempfile::TempDir) -> Self {
        let inner = LocalStore::new(temp_dir.path().join("files"))
            .expect("Failed to create test blob store");
        Self {
            inner,
            fail_put: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> Result<(), BlobStoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), BlobStoreError> {
        Self::check(&self.fail_put)?;
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        Self::check(&self.fail_get)?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        Self::check(&self.fail_delete)?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        self.inner.exists(key).await
    }
}

/// Local store that runs a hook after each successful put, to change
/// metadata underneath a write that is still in flight.
pub struct HookedStore {
    inner: LocalStore,
    after_put: Box<dyn Fn(&str) + Send + Sync>,
}

impl HookedStore {
    pub fn new(
        temp_dir: &tempfile::TempDir,
        after_put: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        let inner = LocalStore::new(temp_dir.path().join("files"))
            .expect("Failed to create test blob store");
        Self {
            inner,
            after_put: Box::new(after_put),
        }
    }
}

#[async_trait]
impl BlobStore for HookedStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), BlobStoreError> {
        self.inner.put(key, data, content_type).await?;
        (self.after_put)(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        self.inner.exists(key).await
    }
}

/// The file part of a multipart upload.
pub struct FilePart<'a> {
    pub file_name: &'a str,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

/// Encode a multipart/form-data body with an optional `file` part and text fields.
pub fn multipart_body(file: Option<&FilePart<'_>>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    if let Some(file) = file {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file.file_name
            )
            .as_bytes(),
        );
        if let Some(content_type) = file.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(file.data);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(
    query: &str,
    file: Option<&FilePart<'_>>,
    fields: &[(&str, &str)],
) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/uploads?{query}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(file, fields)))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

/// Run one request through a router built over `state`.
pub async fn send(state: &Arc<AppState>, request: Request<Body>) -> TestResponse {
    let router: Router = crate::api::create_router(Arc::clone(state));
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    TestResponse {
        status,
        headers,
        body,
    }
}

/// A syntactically valid PNG of roughly `len` bytes.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend((0..len.saturating_sub(data.len())).map(|i| (i % 251) as u8));
    data
}

/// Files currently present in the local blob directory.
pub fn stored_blobs(temp_dir: &tempfile::TempDir) -> Vec<String> {
    let dir = temp_dir.path().join("files");
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}
