use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::blob_store::BlobStoreError;
use crate::media;
use crate::AppState;

/// Asset bytes never change under an id, so caches may keep them forever.
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

/// Stream an asset's bytes back with the type recovered from its key.
///
/// Exactly one key is tried: the canonical one, or the legacy path on rows
/// that were never backfilled.
pub async fn serve_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(asset) = state.db.get_asset(&id)? else {
        tracing::debug!(asset_id = %id, "Asset metadata not found");
        return Err(ApiError::not_found("Asset not found"));
    };

    let Some(key) = asset.resolved_key() else {
        tracing::warn!(asset_id = %id, "Asset row has no storage key");
        return Err(ApiError::not_found("Asset not found"));
    };

    let data = match state.blob_store.get(key).await {
        Ok(data) => data,
        Err(e) if e.is_not_found() => {
            tracing::warn!(
                asset_id = %id,
                storage_key = %key,
                "Metadata exists but blob is missing"
            );
            return Err(ApiError::not_found("Asset not found"));
        }
        Err(BlobStoreError::InvalidKey(_)) => {
            tracing::warn!(
                asset_id = %id,
                storage_key = %key,
                "Asset row has an unresolvable legacy path"
            );
            return Err(ApiError::not_found("Asset not found"));
        }
        Err(e) => {
            tracing::error!(
                asset_id = %id,
                storage_key = %key,
                error = %e,
                "Blob read failed"
            );
            return Err(ApiError::unavailable("Storage is unavailable, retry shortly"));
        }
    };

    let content_type = media::content_type_for_key(key);

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, IMMUTABLE_CACHE.to_string()),
            (header::CONTENT_LENGTH, data.len().to_string()),
        ],
        data,
    )
        .into_response())
}
