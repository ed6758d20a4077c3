use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::{AssetRecord, Collection, NewAsset};
use super::tables::*;

impl Database {
    // ========================================================================
    // Asset operations
    // ========================================================================

    /// Insert the metadata row for a freshly written blob.
    ///
    /// `seq` and `created_at` are assigned inside the write transaction.
    /// `created_at` never drops below the last value handed out, even if the
    /// wall clock steps backwards, so listing order always follows commit order.
    pub fn insert_asset(&self, new: &NewAsset) -> Result<AssetRecord, DatabaseError> {
        if new.id.trim().is_empty() {
            return Err(DatabaseError::Validation("asset id must not be empty".into()));
        }
        if new.storage_key.trim().is_empty() {
            return Err(DatabaseError::Validation(
                "storage key must not be empty".into(),
            ));
        }

        let owner_id = new
            .owner_id
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty());
        if new.collection.requires_owner() && owner_id.is_none() {
            return Err(DatabaseError::Validation(format!(
                "{} requires an owner id",
                new.collection
            )));
        }

        let write_txn = self.begin_write()?;
        let record = {
            if new.collection == Collection::AlbumImages {
                let albums = write_txn.open_table(ALBUMS)?;
                if albums.get(owner_id.unwrap_or_default())?.is_none() {
                    return Err(DatabaseError::Validation(format!(
                        "album '{}' does not exist",
                        owner_id.unwrap_or_default()
                    )));
                }
            }

            let mut assets = write_txn.open_table(ASSETS)?;
            if assets.get(new.id.as_str())?.is_some() {
                return Err(DatabaseError::Validation(format!(
                    "asset '{}' already exists",
                    new.id
                )));
            }

            let seq = next_counter(&write_txn, ASSET_SEQ)?;
            let now = monotonic_now(&write_txn)?;
            let record = AssetRecord {
                id: new.id.clone(),
                collection: new.collection,
                owner_id: owner_id.map(str::to_string),
                storage_key: Some(new.storage_key.clone()),
                legacy_path: None,
                byte_size: new.byte_size,
                seq,
                created_at: now,
                updated_at: now,
                caption: new.caption.clone(),
                description: new.description.clone(),
            };

            let data = rmp_serde::to_vec_named(&record)?;
            assets.insert(record.id.as_str(), data.as_slice())?;
            index_add(&write_txn, record.collection, &record.id)?;
            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    /// Store a record as-is. Used for imported legacy rows.
    pub fn put_asset(&self, record: &AssetRecord) -> Result<(), DatabaseError> {
        debug_assert!(!record.id.is_empty(), "asset id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut assets = write_txn.open_table(ASSETS)?;
            let previous: Option<AssetRecord> = match assets.get(record.id.as_str())? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            let data = rmp_serde::to_vec_named(record)?;
            assets.insert(record.id.as_str(), data.as_slice())?;

            if let Some(previous) = previous.filter(|p| p.collection != record.collection) {
                index_remove(&write_txn, previous.collection, &record.id)?;
            }
            index_add(&write_txn, record.collection, &record.id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_asset(&self, id: &str) -> Result<Option<AssetRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ASSETS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Assets of a collection, optionally narrowed to one owner, newest first.
    pub fn list_assets(
        &self,
        collection: Collection,
        owner_id: Option<&str>,
    ) -> Result<Vec<AssetRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(COLLECTION_ASSETS)?;
        let assets = read_txn.open_table(ASSETS)?;

        let ids: Vec<String> = match index.get(collection.as_str())? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = assets.get(id.as_str())? {
                let record: AssetRecord = rmp_serde::from_slice(data.value())?;
                if owner_id.map_or(true, |o| record.owner_id.as_deref() == Some(o)) {
                    records.push(record);
                }
            }
        }

        records.sort_by(newest_first);
        Ok(records)
    }

    /// Update the descriptive fields. `None` keeps a field, `Some(None)` clears it.
    pub fn update_asset(
        &self,
        id: &str,
        caption: Option<Option<&str>>,
        description: Option<Option<&str>>,
    ) -> Result<Option<AssetRecord>, DatabaseError> {
        self.modify_asset(id, |record| {
            if let Some(c) = caption {
                record.caption = c.map(str::to_string);
            }
            if let Some(d) = description {
                record.description = d.map(str::to_string);
            }
        })
    }

    /// Point a row at its canonical key and drop the legacy path.
    pub fn set_storage_key(&self, id: &str, key: &str) -> Result<bool, DatabaseError> {
        let updated = self.modify_asset(id, |record| {
            record.storage_key = Some(key.to_string());
            record.legacy_path = None;
        })?;
        Ok(updated.is_some())
    }

    /// Delete an asset row and its index entry. Returns false if it did not exist.
    pub fn delete_asset(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = remove_asset(&write_txn, id)?;
        write_txn.commit()?;
        Ok(removed.is_some())
    }

    pub fn get_all_assets(&self) -> Result<Vec<AssetRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ASSETS)?;

        let mut assets = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            assets.push(rmp_serde::from_slice(value.value())?);
        }

        Ok(assets)
    }

    fn modify_asset(
        &self,
        id: &str,
        apply: impl FnOnce(&mut AssetRecord),
    ) -> Result<Option<AssetRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(ASSETS)?;
            let existing: Option<AssetRecord> = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            match existing {
                Some(mut record) => {
                    apply(&mut record);
                    record.updated_at = Utc::now();
                    let data = rmp_serde::to_vec_named(&record)?;
                    table.insert(id, data.as_slice())?;
                    Some(record)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }
}

/// Newest first; insertion sequence settles identical timestamps.
pub(super) fn newest_first(a: &AssetRecord, b: &AssetRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.seq.cmp(&a.seq))
}

/// Remove an asset row and its index entry within an open transaction.
pub(super) fn remove_asset(
    write_txn: &WriteTransaction,
    id: &str,
) -> Result<Option<AssetRecord>, DatabaseError> {
    let removed: Option<AssetRecord> = {
        let mut table = write_txn.open_table(ASSETS)?;
        let removed = match table.remove(id)? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        removed
    };

    if let Some(ref record) = removed {
        index_remove(write_txn, record.collection, id)?;
    }
    Ok(removed)
}

fn next_counter(write_txn: &WriteTransaction, name: &str) -> Result<u64, DatabaseError> {
    let mut table = write_txn.open_table(COUNTERS)?;
    let next = table.get(name)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(name, next)?;
    Ok(next)
}

/// Wall-clock time, clamped to the last asset creation time.
fn monotonic_now(write_txn: &WriteTransaction) -> Result<DateTime<Utc>, DatabaseError> {
    let mut table = write_txn.open_table(COUNTERS)?;
    let floor = table
        .get(ASSET_CREATED_NANOS)?
        .and_then(|v| i64::try_from(v.value()).ok())
        .map(DateTime::from_timestamp_nanos);

    let wall = Utc::now();
    let now = match floor {
        Some(floor) if floor > wall => floor,
        _ => wall,
    };
    if let Some(nanos) = now.timestamp_nanos_opt().and_then(|n| u64::try_from(n).ok()) {
        table.insert(ASSET_CREATED_NANOS, nanos)?;
    }
    Ok(now)
}

fn index_add(
    write_txn: &WriteTransaction,
    collection: Collection,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut table = write_txn.open_table(COLLECTION_ASSETS)?;
    let mut ids: Vec<String> = match table.get(collection.as_str())? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };

    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(collection.as_str(), data.as_slice())?;
    }
    Ok(())
}

fn index_remove(
    write_txn: &WriteTransaction,
    collection: Collection,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut table = write_txn.open_table(COLLECTION_ASSETS)?;
    let ids: Option<Vec<String>> = match table.get(collection.as_str())? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };

    if let Some(mut ids) = ids {
        ids.retain(|existing| existing != id);
        if ids.is_empty() {
            table.remove(collection.as_str())?;
        } else {
            let data = rmp_serde::to_vec_named(&ids)?;
            table.insert(collection.as_str(), data.as_slice())?;
        }
    }
    Ok(())
}
