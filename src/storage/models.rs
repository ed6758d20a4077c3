use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad kind of media a collection holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFamily {
    Audio,
    Document,
    Image,
}

/// The logical group an asset belongs to. Each one backs a different part
/// of the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    AlbumImages,
    BannerAssets,
    Books,
    HeroImages,
    PageBackgrounds,
    SectionBackgrounds,
    Songs,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::AlbumImages,
        Collection::BannerAssets,
        Collection::Books,
        Collection::HeroImages,
        Collection::PageBackgrounds,
        Collection::SectionBackgrounds,
        Collection::Songs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::AlbumImages => "album_images",
            Collection::BannerAssets => "banner_assets",
            Collection::Books => "books",
            Collection::HeroImages => "hero_images",
            Collection::PageBackgrounds => "page_backgrounds",
            Collection::SectionBackgrounds => "section_backgrounds",
            Collection::Songs => "songs",
        }
    }

    pub fn family(&self) -> MediaFamily {
        match self {
            Collection::Books => MediaFamily::Document,
            Collection::Songs => MediaFamily::Audio,
            _ => MediaFamily::Image,
        }
    }

    /// Album photos hang off an album, page backgrounds off a page name.
    pub fn requires_owner(&self) -> bool {
        matches!(self, Collection::AlbumImages | Collection::PageBackgrounds)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCollection(pub String);

impl fmt::Display for UnknownCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown collection '{}'", self.0)
    }
}

impl std::error::Error for UnknownCollection {}

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCollection(s.to_string()))
    }
}

/// An asset's metadata row, stored as msgpack in redb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub collection: Collection,
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Canonical `{id}.{ext}` key. Absent only on rows imported from the old site.
    #[serde(default)]
    pub storage_key: Option<String>,
    /// Historical key or path carried by legacy rows until they are backfilled.
    #[serde(default)]
    pub legacy_path: Option<String>,
    pub byte_size: u64,
    /// Insertion order assigned by the database, breaks `created_at` ties.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl AssetRecord {
    /// The key the blob lives under, if the row has one at all.
    pub fn resolved_key(&self) -> Option<&str> {
        self.storage_key
            .as_deref()
            .or(self.legacy_path.as_deref())
            .filter(|k| !k.is_empty())
    }
}

/// Fields supplied by the upload path; the database fills in the rest.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub id: String,
    pub collection: Collection,
    pub owner_id: Option<String>,
    pub storage_key: String,
    pub byte_size: u64,
    pub caption: Option<String>,
    pub description: Option<String>,
}

/// A gallery album. Photos reference it through `AssetRecord::owner_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
