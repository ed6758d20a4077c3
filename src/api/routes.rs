use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Room for multipart boundaries and the descriptive text fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.limits.largest() as usize + MULTIPART_OVERHEAD;

    let mut router = Router::new()
        // Assets
        .route(
            "/uploads",
            post(handlers::upload_asset).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/assets/:id",
            get(handlers::serve_asset)
                .put(handlers::update_asset)
                .delete(handlers::delete_asset),
        )
        .route("/assets/:id/meta", get(handlers::get_asset))
        .route("/collections/:collection", get(handlers::list_collection))
        // Albums
        .route(
            "/albums",
            get(handlers::list_albums).post(handlers::create_album),
        )
        .route(
            "/albums/:id",
            get(handlers::get_album)
                .put(handlers::rename_album)
                .delete(handlers::delete_album),
        )
        // Internal
        .route("/_internal/backfill", post(handlers::backfill))
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge route is available");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
