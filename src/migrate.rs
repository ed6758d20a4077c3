//! One-time backfill of legacy rows onto canonical storage keys.
//!
//! Rows imported from the old site carry only a `legacy_path`, written in
//! whatever shape that site used: a bare filename, a `{collection}/{name}`
//! path, a `photo-{name}` key or a full URL. The backfill finds the blob
//! behind each of those, copies it to `{id}.{ext}` and points the row at the
//! new key. Retrieval itself only ever tries one key.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::blob_store::{BlobStore, BlobStoreError};
use crate::media;
use crate::storage::models::{AssetRecord, Collection};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error while backfilling asset {id}: {source}")]
    Storage {
        id: String,
        #[source]
        source: BlobStoreError,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    pub scanned: u64,
    pub migrated: u64,
    pub unresolved: u64,
    /// Rows deleted while their blob was being copied.
    pub vanished: u64,
    pub already_canonical: u64,
}

enum Outcome {
    Migrated,
    Unresolved,
    Vanished,
}

/// Keys an old row's blob may live under, most specific first.
pub fn legacy_candidates(collection: Collection, legacy_path: &str) -> Vec<String> {
    let path = legacy_path.trim();
    if path.is_empty() {
        return Vec::new();
    }

    let is_url = path.starts_with("http://") || path.starts_with("https://");
    let without_query = path.split(['?', '#']).next().unwrap_or(path);
    let name = without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .trim();

    let mut candidates: Vec<String> = Vec::with_capacity(4);
    let mut push = |key: String| {
        if !key.is_empty() && !candidates.contains(&key) {
            candidates.push(key);
        }
    };

    if !is_url {
        push(path.to_string());
    }
    if !name.is_empty() {
        push(name.to_string());
        push(format!("{}/{}", collection, name));
        push(format!("photo-{name}"));
    }

    candidates
}

/// Rewrite every row that has no canonical key yet.
///
/// Missing blobs are counted and skipped. A backend failure stops the run so
/// it can be retried; rows already migrated stay migrated and old blobs are
/// left in place.
pub async fn backfill_legacy_keys(
    db: &Database,
    store: &dyn BlobStore,
) -> Result<BackfillStats, BackfillError> {
    let mut stats = BackfillStats::default();

    for record in db.get_all_assets()? {
        stats.scanned += 1;

        if record.storage_key.as_deref().is_some_and(|k| !k.is_empty()) {
            stats.already_canonical += 1;
            continue;
        }

        match migrate_record(db, store, &record).await? {
            Outcome::Migrated => stats.migrated += 1,
            Outcome::Vanished => stats.vanished += 1,
            Outcome::Unresolved => {
                warn!(
                    asset_id = %record.id,
                    legacy_path = record.legacy_path.as_deref().unwrap_or(""),
                    "No blob found for legacy asset"
                );
                stats.unresolved += 1;
            }
        }
    }

    info!(
        scanned = stats.scanned,
        migrated = stats.migrated,
        unresolved = stats.unresolved,
        vanished = stats.vanished,
        already_canonical = stats.already_canonical,
        "Legacy key backfill finished"
    );

    Ok(stats)
}

async fn migrate_record(
    db: &Database,
    store: &dyn BlobStore,
    record: &AssetRecord,
) -> Result<Outcome, BackfillError> {
    let Some(legacy_path) = record.legacy_path.as_deref() else {
        return Ok(Outcome::Unresolved);
    };

    for candidate in legacy_candidates(record.collection, legacy_path) {
        let data = match store.get(&candidate).await {
            Ok(data) => data,
            Err(BlobStoreError::NotFound(_) | BlobStoreError::InvalidKey(_)) => continue,
            Err(source) => {
                return Err(BackfillError::Storage {
                    id: record.id.clone(),
                    source,
                })
            }
        };

        let ext = candidate
            .rsplit('/')
            .next()
            .and_then(media::file_extension)
            .unwrap_or_else(|| media::FALLBACK_EXTENSION.to_string());
        let key = media::storage_key(&record.id, &ext);

        if candidate != key {
            store
                .put(&key, data, &media::content_type_for_key(&key))
                .await
                .map_err(|source| BackfillError::Storage {
                    id: record.id.clone(),
                    source,
                })?;
        }

        // The row may have been deleted while we were copying.
        if !db.set_storage_key(&record.id, &key)? {
            if candidate != key {
                warn!(
                    asset_id = %record.id,
                    orphan_key = %key,
                    "Asset deleted during backfill; copied blob left orphaned"
                );
            } else {
                debug!(asset_id = %record.id, "Asset deleted during backfill");
            }
            return Ok(Outcome::Vanished);
        }

        debug!(
            asset_id = %record.id,
            from = %candidate,
            to = %key,
            "Backfilled legacy asset"
        );
        return Ok(Outcome::Migrated);
    }

    Ok(Outcome::Unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::LocalStore;
    use chrono::Utc;

    fn legacy(id: &str, collection: Collection, legacy_path: Option<&str>) -> AssetRecord {
        let now = Utc::now();
        AssetRecord {
            id: id.to_string(),
            collection,
            owner_id: None,
            storage_key: None,
            legacy_path: legacy_path.map(str::to_string),
            byte_size: 0,
            seq: 0,
            created_at: now,
            updated_at: now,
            caption: None,
            description: None,
        }
    }

    fn setup() -> (tempfile::TempDir, Database, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("data")).unwrap();
        let store = LocalStore::new(dir.path().join("files")).unwrap();
        (dir, db, store)
    }

    #[test]
    fn candidates_for_bare_name() {
        assert_eq!(
            legacy_candidates(Collection::HeroImages, "diya.png"),
            vec![
                "diya.png".to_string(),
                "hero_images/diya.png".to_string(),
                "photo-diya.png".to_string(),
            ]
        );
    }

    #[test]
    fn candidates_for_url_skip_the_url_itself() {
        let candidates = legacy_candidates(
            Collection::AlbumImages,
            "https://storage.example.com/uploads/rangoli.jpg?v=3",
        );
        assert_eq!(candidates[0], "rangoli.jpg");
        assert_eq!(candidates[1], "album_images/rangoli.jpg");
        assert_eq!(candidates[2], "photo-rangoli.jpg");
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn candidates_for_nested_path_try_it_first() {
        let candidates = legacy_candidates(Collection::Songs, "songs/bhajan.mp3");
        assert_eq!(candidates[0], "songs/bhajan.mp3");
        assert_eq!(candidates[1], "bhajan.mp3");
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn blank_path_has_no_candidates() {
        assert!(legacy_candidates(Collection::Books, "  ").is_empty());
    }

    #[tokio::test]
    async fn backfill_copies_to_canonical_keys() {
        let (_dir, db, store) = setup();

        store
            .put("section_backgrounds/lotus.webp", "lotus".into(), "image/webp")
            .await
            .unwrap();
        store
            .put("photo-kalash", "kalash".into(), "application/octet-stream")
            .await
            .unwrap();

        db.put_asset(&legacy(
            "a",
            Collection::SectionBackgrounds,
            Some("/static/lotus.webp"),
        ))
        .unwrap();
        db.put_asset(&legacy("b", Collection::HeroImages, Some("kalash")))
            .unwrap();
        db.put_asset(&legacy("c", Collection::HeroImages, Some("missing.png")))
            .unwrap();
        db.put_asset(&legacy("d", Collection::HeroImages, None)).unwrap();

        let mut canonical = legacy("e", Collection::HeroImages, None);
        canonical.storage_key = Some("e.png".to_string());
        db.put_asset(&canonical).unwrap();

        let stats = backfill_legacy_keys(&db, &store).await.unwrap();
        assert_eq!(
            stats,
            BackfillStats {
                scanned: 5,
                migrated: 2,
                unresolved: 2,
                vanished: 0,
                already_canonical: 1,
            }
        );

        let a = db.get_asset("a").unwrap().unwrap();
        assert_eq!(a.storage_key.as_deref(), Some("a.webp"));
        assert!(a.legacy_path.is_none());
        assert_eq!(store.get("a.webp").await.unwrap().as_ref(), b"lotus");
        assert!(store.exists("section_backgrounds/lotus.webp").await.unwrap());

        let b = db.get_asset("b").unwrap().unwrap();
        assert_eq!(b.storage_key.as_deref(), Some("b.jpg"));

        let c = db.get_asset("c").unwrap().unwrap();
        assert!(c.storage_key.is_none());
        assert_eq!(c.legacy_path.as_deref(), Some("missing.png"));
    }

    #[tokio::test]
    async fn row_deleted_mid_copy_is_counted_as_vanished() {
        let dir = tempfile::tempdir().unwrap();
        let db = crate::testutil::test_db(&dir);
        let racing_db = db.clone();
        let store = crate::testutil::HookedStore::new(&dir, move |_| {
            racing_db.delete_asset("gone").unwrap();
        });

        // Seeding runs the hook too, before the row exists.
        store
            .put("shankh.jpg", "shankh".into(), "image/jpeg")
            .await
            .unwrap();
        db.put_asset(&legacy("gone", Collection::HeroImages, Some("shankh.jpg")))
            .unwrap();

        let stats = backfill_legacy_keys(&db, &store).await.unwrap();
        assert_eq!(stats.vanished, 1);
        assert_eq!(stats.unresolved, 0);
        assert_eq!(stats.migrated, 0);

        assert!(db.get_asset("gone").unwrap().is_none());
        // The copy stays behind for reconciliation.
        assert!(store.exists("gone.jpg").await.unwrap());
        assert!(store.exists("shankh.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let (_dir, db, store) = setup();
        store.put("om.png", "om".into(), "image/png").await.unwrap();
        db.put_asset(&legacy("om", Collection::BannerAssets, Some("om.png")))
            .unwrap();

        let first = backfill_legacy_keys(&db, &store).await.unwrap();
        assert_eq!(first.migrated, 1);

        let second = backfill_legacy_keys(&db, &store).await.unwrap();
        assert_eq!(second.migrated, 0);
        assert_eq!(second.already_canonical, 1);
    }
}
