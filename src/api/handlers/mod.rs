mod admin;
mod albums;
mod assets;
mod serve;

pub use admin::{admin_purge, backfill, health};
pub use albums::{create_album, delete_album, get_album, list_albums, rename_album};
pub use assets::{delete_asset, get_asset, list_collection, update_asset, upload_asset};
pub use serve::serve_asset;

/// Path a browser uses to fetch an asset. Never the storage key.
pub fn asset_url(id: &str) -> String {
    format!("/assets/{id}")
}
