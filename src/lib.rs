//! temple-assets - media asset storage and retrieval for the temple website
//!
//! This crate provides upload, metadata management, and content serving with:
//! - Swappable blob storage backends (local filesystem, GCS) behind one trait
//! - redb embedded database for asset and album metadata (ACID, crash-safe)
//! - REST API with multipart upload and long-lived cacheable retrieval
//! - A one-time backfill that moves legacy rows onto canonical storage keys

pub mod api;
pub mod blob_store;
pub mod config;
pub mod media;
pub mod migrate;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub blob_store: Arc<dyn blob_store::BlobStore>,
}
