//! MIME type detection from file content.
//!
//! Content sniffing via magic bytes, with an extension fallback for text
//! formats that have no magic. Detection results are cached in the `mime`
//! namespace keyed by path, size, and mtime.

use std::fs;
use std::path::Path;

use super::{file_params, ExtractionError};
use crate::cache::{CachePayload, CacheStore};

/// Detect the MIME type of a file from its content, falling back to the
/// extension for unmagical text formats.
pub fn detect_mime(path: &Path) -> Result<String, ExtractionError> {
    match infer::get_from_path(path)? {
        Some(kind) => Ok(kind.mime_type().to_string()),
        None => Ok(extension_mime(path)),
    }
}

/// MIME detection through the cache: tiny entries, long TTL, and the sniff
/// is skipped entirely for files seen before.
pub fn detect_mime_cached(path: &Path, cache: &CacheStore) -> Result<String, ExtractionError> {
    let metadata = fs::metadata(path)?;
    let params = file_params(path, &metadata);

    if let Some(mime) = cache.get(&params).and_then(CachePayload::into_text) {
        return Ok(mime);
    }

    let mime = detect_mime(path)?;
    cache.set(&CachePayload::Text(mime.clone()), &params);
    Ok(mime)
}

/// Map a file extension to a MIME type for formats content sniffing cannot
/// identify (plain text carries no magic bytes).
fn extension_mime(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "md" | "markdown" => "text/markdown",
        "txt" | "text" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "csv" => "text/csv",
        "tex" => "application/x-latex",
        "rst" => "text/x-rst",
        _ => "application/octet-stream",
    }
    .to_string()
}
