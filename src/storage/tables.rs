use redb::TableDefinition;

/// Asset records: id -> AssetRecord (msgpack)
pub const ASSETS: TableDefinition<&str, &[u8]> = TableDefinition::new("assets");

/// Collection index: collection name -> msgpack Vec of asset ids
pub const COLLECTION_ASSETS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("collection_assets");

/// Gallery albums: id -> AlbumRecord (msgpack)
pub const ALBUMS: TableDefinition<&str, &[u8]> = TableDefinition::new("albums");

/// Monotonic counters: name -> last value handed out
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

pub const ASSET_SEQ: &str = "asset_seq";

/// Latest `created_at` handed to an asset, in nanoseconds since the epoch.
pub const ASSET_CREATED_NANOS: &str = "asset_created_nanos";
