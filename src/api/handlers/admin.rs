use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::migrate::{self, BackfillError, BackfillStats};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage_backend: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub albums_deleted: u64,
    pub assets_deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        storage_backend: state.config.storage.backend.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Drop every metadata row. Blobs are left alone; this only exists for test
/// environments that reset between runs.
pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    let stats = state.db.purge_all()?;

    tracing::warn!(
        assets = stats.assets,
        albums = stats.albums,
        "Purged all metadata"
    );

    Ok(JSend::success(PurgeResponse {
        albums_deleted: stats.albums,
        assets_deleted: stats.assets,
    }))
}

pub async fn backfill(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<BackfillStats>>, ApiError> {
    let stats = migrate::backfill_legacy_keys(&state.db, state.blob_store.as_ref())
        .await
        .map_err(|e| match e {
            BackfillError::Database(e) => ApiError::from(e),
            BackfillError::Storage { id, source } => {
                tracing::error!(asset_id = %id, error = %source, "Backfill aborted");
                ApiError::unavailable("Storage is unavailable, retry shortly")
            }
        })?;

    Ok(JSend::success(stats))
}
