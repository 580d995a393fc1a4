//! Text extraction from documents using external tools.
//!
//! Extracts text from heterogeneous inputs:
//! - pdftotext (Poppler) for PDF text layers, with Tesseract OCR fallback
//!   for image-based pages
//! - pandoc for office and markup formats (DOCX, ODT, HTML, EPUB, RTF)
//! - Tesseract OCR for image files
//! - direct reads for plain text and markdown
//!
//! Also includes MIME detection (content sniffing with extension fallback)
//! and table detection over pdftotext layout output. The extraction
//! algorithms themselves are black-box external binaries; this module is the
//! plumbing around them.

mod extractor;
mod mime;
mod pandoc;
mod pdf;
pub mod tables;
mod text;
mod tool;

pub use extractor::Extractor;
pub use mime::{detect_mime, detect_mime_cached};
pub use tool::check_binary;

use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;

use thiserror::Error;

use crate::cache::ParamValue;
use crate::isolated::WorkerError;

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl ExtractionError {
    /// Machine-readable variant name, used as the `kind` field when a worker
    /// marshals this error across the process boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFileType(_) => "UnsupportedFileType",
            Self::ToolNotFound(_) => "ToolNotFound",
            Self::ExtractionFailed(_) => "ExtractionFailed",
            Self::Io(_) => "Io",
            Self::Worker(_) => "Worker",
        }
    }
}

/// Cache fingerprint parameters identifying a file's current content:
/// path plus size and mtime, so edits invalidate naturally.
pub(crate) fn file_params(path: &Path, metadata: &Metadata) -> Vec<(&'static str, ParamValue)> {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    vec![
        ("path", ParamValue::Str(path.to_string_lossy().into_owned())),
        ("size", ParamValue::Int(metadata.len() as i64)),
        ("mtime", ParamValue::Float(mtime)),
    ]
}
