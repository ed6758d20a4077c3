//! Media classification for uploads and downloads.
//!
//! Decides which files a collection accepts, how large they may be, which
//! extension a new storage key gets, and which `Content-Type` a stored key is
//! served with. The content kind is never stored; it is always recovered
//! from the key's suffix.

use crate::config::UploadLimits;
use crate::storage::models::{Collection, MediaFamily};

/// Extension used when neither the MIME type nor the filename yields one.
pub const FALLBACK_EXTENSION: &str = "jpg";

/// The banner slot whose uploads get the tighter logo ceiling.
pub const LOGO_SLOT: &str = "logo";

const SONG_EXTENSIONS: &[&str] = &[
    "mp3", "mp4", "wav", "m4a", "flac", "ogg", "webm", "avi", "mov", "mkv",
];

const BOOK_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "epub"];

/// MIME types whose subtype does not make a usable extension.
const KNOWN_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/pjpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/svg+xml", "svg"),
    ("image/bmp", "bmp"),
    ("image/tiff", "tiff"),
    ("image/x-icon", "ico"),
    ("image/vnd.microsoft.icon", "ico"),
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/aac", "aac"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/wave", "wav"),
    ("audio/ogg", "ogg"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
    ("audio/webm", "webm"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
    ("video/x-msvideo", "avi"),
    ("video/x-matroska", "mkv"),
    ("application/pdf", "pdf"),
    ("application/epub+zip", "epub"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("text/plain", "txt"),
];

/// The MIME type a client declared for a file part.
///
/// The multipart `Content-Type` wins unless it is missing or the generic
/// octet-stream, in which case the filename is consulted.
pub fn declared_mime(content_type: Option<&str>, file_name: Option<&str>) -> Option<String> {
    content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .or_else(|| {
            file_name
                .and_then(|n| mime_guess::from_path(n).first())
                .map(|m| m.essence_str().to_string())
        })
}

/// Lowercased extension of a filename, if it has a sane one.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 8 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether a collection takes a file with this MIME type and filename.
pub fn accepts(collection: Collection, mime: Option<&str>, file_name: Option<&str>) -> bool {
    let mime = mime.unwrap_or("");
    let ext = file_name.and_then(file_extension);
    let ext_in = |allowed: &[&str]| ext.as_deref().is_some_and(|e| allowed.contains(&e));

    match collection.family() {
        MediaFamily::Image => mime.starts_with("image/"),
        MediaFamily::Audio => {
            mime.starts_with("audio/") || mime.starts_with("video/") || ext_in(SONG_EXTENSIONS)
        }
        MediaFamily::Document => {
            mime == "application/pdf"
                || mime.starts_with("text/")
                || mime.contains("document")
                || mime.contains("word")
                || mime == "application/epub+zip"
                || ext_in(BOOK_EXTENSIONS)
        }
    }
}

/// Largest accepted upload for a collection slot, in bytes.
pub fn max_upload_bytes(
    collection: Collection,
    owner_id: Option<&str>,
    limits: &UploadLimits,
) -> u64 {
    match collection.family() {
        MediaFamily::Audio => limits.audio,
        MediaFamily::Document => limits.document,
        MediaFamily::Image
            if collection == Collection::BannerAssets && owner_id == Some(LOGO_SLOT) =>
        {
            limits.logo
        }
        MediaFamily::Image => limits.image,
    }
}

/// Extension for a new storage key: known MIME table, then the filename,
/// then [`FALLBACK_EXTENSION`].
pub fn extension_for(mime: Option<&str>, file_name: Option<&str>) -> String {
    mime.and_then(|m| {
        KNOWN_EXTENSIONS
            .iter()
            .find(|(known, _)| *known == m)
            .map(|(_, ext)| ext.to_string())
    })
    .or_else(|| file_name.and_then(file_extension))
    .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// The canonical key for an asset: `{id}.{ext}`.
pub fn storage_key(id: &str, ext: &str) -> String {
    format!("{id}.{ext}")
}

/// `Content-Type` to serve a stored key with, inferred from its suffix.
pub fn content_type_for_key(key: &str) -> String {
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
