use chrono::Utc;
use redb::ReadableTable;

use super::assets::remove_asset;
use super::db::{Database, DatabaseError};
use super::models::{AlbumRecord, AssetRecord, Collection};
use super::tables::*;

impl Database {
    // ========================================================================
    // Album operations
    // ========================================================================

    pub fn create_album(&self, name: &str) -> Result<AlbumRecord, DatabaseError> {
        let name = validate_album_name(name)?;
        let now = Utc::now();
        let album = AlbumRecord {
            id: uuid::Uuid::now_v7().to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.put_album(&album)?;
        Ok(album)
    }

    /// Store an album record as-is, replacing any album with the same id.
    pub fn put_album(&self, album: &AlbumRecord) -> Result<(), DatabaseError> {
        debug_assert!(!album.id.is_empty(), "album id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(ALBUMS)?;
            let data = rmp_serde::to_vec_named(album)?;
            table.insert(album.id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_album(&self, id: &str) -> Result<Option<AlbumRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ALBUMS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// All albums, oldest first.
    pub fn list_albums(&self) -> Result<Vec<AlbumRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ALBUMS)?;

        let mut albums: Vec<AlbumRecord> = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            albums.push(rmp_serde::from_slice(value.value())?);
        }

        albums.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(albums)
    }

    pub fn rename_album(&self, id: &str, name: &str) -> Result<Option<AlbumRecord>, DatabaseError> {
        let name = validate_album_name(name)?;

        let write_txn = self.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(ALBUMS)?;
            let existing: Option<AlbumRecord> = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            match existing {
                Some(mut album) => {
                    album.name = name.to_string();
                    album.updated_at = Utc::now();
                    let data = rmp_serde::to_vec_named(&album)?;
                    table.insert(id, data.as_slice())?;
                    Some(album)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Delete an album together with its photo rows in one transaction.
    /// Returns the removed photo records so their blobs can be cleaned up,
    /// or `None` if the album did not exist.
    pub fn delete_album(&self, id: &str) -> Result<Option<Vec<AssetRecord>>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(ALBUMS)?;
            let existed = table.remove(id)?.is_some();
            existed
        };

        if !existed {
            return Ok(None);
        }

        let photo_ids: Vec<String> = {
            let index = write_txn.open_table(COLLECTION_ASSETS)?;
            let assets = write_txn.open_table(ASSETS)?;
            let ids: Vec<String> = match index.get(Collection::AlbumImages.as_str())? {
                Some(data) => rmp_serde::from_slice(data.value())?,
                None => Vec::new(),
            };

            let mut owned = Vec::new();
            for photo_id in ids {
                if let Some(data) = assets.get(photo_id.as_str())? {
                    let record: AssetRecord = rmp_serde::from_slice(data.value())?;
                    if record.owner_id.as_deref() == Some(id) {
                        owned.push(photo_id);
                    }
                }
            }
            owned
        };

        let mut removed = Vec::with_capacity(photo_ids.len());
        for photo_id in &photo_ids {
            if let Some(record) = remove_asset(&write_txn, photo_id)? {
                removed.push(record);
            }
        }
        write_txn.commit()?;

        Ok(Some(removed))
    }
}

fn validate_album_name(name: &str) -> Result<&str, DatabaseError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DatabaseError::Validation("album name is required".into()));
    }
    Ok(name)
}
