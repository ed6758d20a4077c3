use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

use super::asset_url;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, Page, Pagination};
use crate::media;
use crate::storage::models::{AssetRecord, Collection, NewAsset, UnknownCollection};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AssetSummary {
    pub byte_size: u64,
    pub caption: Option<String>,
    pub collection: Collection,
    pub content_type: Option<String>,
    pub created_at: String,
    pub description: Option<String>,
    pub id: String,
    pub owner_id: Option<String>,
    pub updated_at: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub collection: String,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateAssetRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub caption: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListAssetsParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub owner: Option<String>,
}

fn default_limit() -> u32 {
    20
}

/// Distinguishes between a missing field (`None`) and an explicit `null` (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// The parts of an upload form we care about.
#[derive(Default)]
struct UploadForm {
    caption: Option<String>,
    content_type: Option<String>,
    data: Option<Bytes>,
    description: Option<String>,
    file_name: Option<String>,
    owner_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_asset(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<UploadParams>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<UploadResponse>>), ApiError> {
    let collection: Collection = params
        .collection
        .parse()
        .map_err(|e: UnknownCollection| ApiError::bad_request(e.to_string()))?;

    let mut form = read_upload_form(multipart).await?;
    if form.owner_id.is_none() {
        form.owner_id = params.owner;
    }
    let owner_id = non_blank(form.owner_id.take());

    // Everything below up to the blob write is validation; nothing is stored yet.
    let data = form
        .data
        .take()
        .ok_or_else(|| ApiError::bad_request("file field is required"))?;
    if data.is_empty() {
        return Err(ApiError::bad_request("file must not be empty"));
    }

    let mime = media::declared_mime(form.content_type.as_deref(), form.file_name.as_deref());
    if !media::accepts(collection, mime.as_deref(), form.file_name.as_deref()) {
        return Err(ApiError::bad_request(format!(
            "{} does not accept {} files",
            collection,
            mime.as_deref().unwrap_or("untyped")
        )));
    }

    if collection.requires_owner() && owner_id.is_none() {
        return Err(ApiError::bad_request(format!(
            "{collection} uploads require an owner (albumId or owner)"
        )));
    }
    if collection == Collection::AlbumImages {
        let album_id = owner_id.as_deref().unwrap_or_default();
        if state.db.get_album(album_id)?.is_none() {
            return Err(ApiError::bad_request(format!(
                "album '{album_id}' does not exist"
            )));
        }
    }

    let limit = media::max_upload_bytes(collection, owner_id.as_deref(), &state.config.limits);
    if data.len() as u64 > limit {
        return Err(ApiError::payload_too_large(format!(
            "File exceeds the {limit} byte limit for {collection}"
        )));
    }

    let ext = media::extension_for(mime.as_deref(), form.file_name.as_deref());
    let id = uuid::Uuid::now_v7().to_string();
    let key = media::storage_key(&id, &ext);
    let content_type = mime.unwrap_or_else(|| media::content_type_for_key(&key));
    let byte_size = data.len() as u64;

    // Phase 1: blob first, so a failure here leaves no metadata behind
    if let Err(e) = state.blob_store.put(&key, data, &content_type).await {
        tracing::error!(
            asset_id = %id,
            storage_key = %key,
            collection = %collection,
            error = %e,
            "Blob write failed, upload aborted"
        );
        return Err(ApiError::unavailable("Storage is unavailable, retry shortly"));
    }

    // Phase 2: metadata row
    let new_asset = NewAsset {
        id: id.clone(),
        collection,
        owner_id,
        storage_key: key.clone(),
        byte_size,
        caption: non_blank(form.caption),
        description: non_blank(form.description),
    };
    let record = state.db.insert_asset(&new_asset).map_err(|e| {
        tracing::error!(
            asset_id = %id,
            orphan_key = %key,
            collection = %collection,
            error = %e,
            "Metadata insert failed after blob write; blob left orphaned for reconciliation"
        );
        ApiError::from(e)
    })?;

    tracing::info!(
        asset_id = %record.id,
        collection = %collection,
        byte_size,
        content_type = %content_type,
        "Stored asset"
    );

    Ok((
        StatusCode::CREATED,
        JSend::success(UploadResponse {
            url: asset_url(&record.id),
            id: record.id,
        }),
    ))
}

pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<AssetSummary>>, ApiError> {
    let asset = state
        .db
        .get_asset(&id)?
        .ok_or_else(|| ApiError::not_found("Asset not found"))?;

    Ok(JSend::success(asset_to_summary(&asset)))
}

pub async fn update_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateAssetRequest>,
) -> Result<Json<JSend<AssetSummary>>, ApiError> {
    if req.caption.is_none() && req.description.is_none() {
        return Err(ApiError::bad_request(
            "at least one field (caption, description) must be provided",
        ));
    }

    let asset = state
        .db
        .update_asset(
            &id,
            req.caption.as_ref().map(|c| c.as_deref()),
            req.description.as_ref().map(|d| d.as_deref()),
        )?
        .ok_or_else(|| ApiError::not_found("Asset not found"))?;

    tracing::debug!(asset_id = %id, "Updated asset");
    Ok(JSend::success(asset_to_summary(&asset)))
}

pub async fn delete_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<DeleteResponse>>, ApiError> {
    let asset = state
        .db
        .get_asset(&id)?
        .ok_or_else(|| ApiError::not_found("Asset not found"))?;

    // Phase 1: blob (best-effort, an orphaned blob is recoverable)
    if let Some(key) = asset.resolved_key() {
        if let Err(e) = state.blob_store.delete(key).await {
            tracing::warn!(
                asset_id = %id,
                storage_key = %key,
                error = %e,
                "Failed to delete blob, leaving it orphaned"
            );
        }
    }

    // Phase 2: metadata (authoritative)
    let deleted = state.db.delete_asset(&id).map_err(|e| {
        tracing::error!(asset_id = %id, error = %e, "Failed to delete asset metadata");
        ApiError::from(e)
    })?;
    if !deleted {
        return Err(ApiError::not_found("Asset not found"));
    }

    tracing::debug!(asset_id = %id, "Deleted asset");
    Ok(JSend::success(DeleteResponse { success: true }))
}

pub async fn list_collection(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    AppQuery(params): AppQuery<ListAssetsParams>,
) -> Result<Json<JSend<Page<AssetSummary>>>, ApiError> {
    let collection: Collection = collection
        .parse()
        .map_err(|e: UnknownCollection| ApiError::bad_request(e.to_string()))?;

    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let assets = state.db.list_assets(collection, params.owner.as_deref())?;
    let total = assets.len() as u64;
    let items: Vec<AssetSummary> = assets
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(asset_to_summary)
        .collect();

    Ok(JSend::page(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

// ============================================================================
// Helpers
// ============================================================================

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(|s| s.to_string());
                form.content_type = field.content_type().map(|s| s.to_string());
                form.data = Some(field.bytes().await.map_err(multipart_error)?);
            }
            "caption" => form.caption = Some(text_field(field, "caption").await?),
            "description" => form.description = Some(text_field(field, "description").await?),
            "owner" | "albumId" | "album_id" => {
                form.owner_id = Some(text_field(field, "owner").await?)
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    Ok(form)
}

async fn text_field(field: Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid {name}: {}", e.body_text())))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large("Upload exceeds the maximum request size");
    }
    ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(super) fn asset_to_summary(asset: &AssetRecord) -> AssetSummary {
    AssetSummary {
        byte_size: asset.byte_size,
        caption: asset.caption.clone(),
        collection: asset.collection,
        content_type: asset.resolved_key().map(media::content_type_for_key),
        created_at: asset.created_at.to_rfc3339(),
        description: asset.description.clone(),
        id: asset.id.clone(),
        owner_id: asset.owner_id.clone(),
        updated_at: asset.updated_at.to_rfc3339(),
        url: asset_url(&asset.id),
    }
}
