use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::storage::models::{AlbumRecord, Collection};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AlbumSummary {
    pub created_at: String,
    pub id: String,
    pub name: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct AlbumDetail {
    #[serde(flatten)]
    pub album: AlbumSummary,
    pub photo_count: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteAlbumResponse {
    pub assets_deleted: u64,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct AlbumRequest {
    pub name: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_albums(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<AlbumSummary>>>, ApiError> {
    let albums = state.db.list_albums()?;
    Ok(JSend::success(albums.iter().map(album_to_summary).collect()))
}

pub async fn create_album(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<AlbumRequest>,
) -> Result<(StatusCode, Json<JSend<AlbumSummary>>), ApiError> {
    let album = state.db.create_album(&req.name)?;

    tracing::info!(album_id = %album.id, name = %album.name, "Created album");
    Ok((StatusCode::CREATED, JSend::success(album_to_summary(&album))))
}

pub async fn get_album(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<AlbumDetail>>, ApiError> {
    let album = state
        .db
        .get_album(&id)?
        .ok_or_else(|| ApiError::not_found("Album not found"))?;
    let photo_count = state
        .db
        .list_assets(Collection::AlbumImages, Some(&id))?
        .len() as u64;

    Ok(JSend::success(AlbumDetail {
        album: album_to_summary(&album),
        photo_count,
    }))
}

pub async fn rename_album(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<AlbumRequest>,
) -> Result<Json<JSend<AlbumSummary>>, ApiError> {
    let album = state
        .db
        .rename_album(&id, &req.name)?
        .ok_or_else(|| ApiError::not_found("Album not found"))?;

    Ok(JSend::success(album_to_summary(&album)))
}

/// Delete an album and every photo in it.
///
/// Rows go first, in one transaction, so no photo is ever left pointing at a
/// missing album. Blobs are removed afterwards; a failure there only orphans
/// bytes.
pub async fn delete_album(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<DeleteAlbumResponse>>, ApiError> {
    let photos = state
        .db
        .delete_album(&id)?
        .ok_or_else(|| ApiError::not_found("Album not found"))?;

    for photo in &photos {
        let Some(key) = photo.resolved_key() else {
            continue;
        };
        if let Err(e) = state.blob_store.delete(key).await {
            tracing::warn!(
                album_id = %id,
                asset_id = %photo.id,
                storage_key = %key,
                error = %e,
                "Failed to delete album photo blob, leaving it orphaned"
            );
        }
    }

    tracing::info!(album_id = %id, photos = photos.len(), "Deleted album");
    Ok(JSend::success(DeleteAlbumResponse {
        assets_deleted: photos.len() as u64,
        success: true,
    }))
}

fn album_to_summary(album: &AlbumRecord) -> AlbumSummary {
    AlbumSummary {
        created_at: album.created_at.to_rfc3339(),
        id: album.id.clone(),
        name: album.name.clone(),
        updated_at: album.updated_at.to_rfc3339(),
    }
}
