//! Document extraction result types.

use serde::{Deserialize, Serialize};

use super::table::TableRecord;

/// Result of extracting text from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted text content (plain text or markdown).
    pub content: String,
    /// Detected MIME type of the source document.
    pub mime_type: String,
    /// Method used for extraction.
    pub method: ExtractionMethod,
    /// Structured metadata about the document.
    pub metadata: DocumentMetadata,
    /// Tables detected in the document, if table extraction was requested.
    pub tables: Vec<TableRecord>,
}

impl ExtractionResult {
    /// Create a result with empty metadata and no tables.
    pub fn new(content: String, mime_type: String, method: ExtractionMethod) -> Self {
        Self {
            content,
            mime_type,
            method,
            metadata: DocumentMetadata::default(),
            tables: Vec::new(),
        }
    }
}

/// Method used to extract text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Plain text or markdown read directly from the file.
    PlainText,
    /// Converted to markdown via pandoc.
    Pandoc,
    /// Direct text extraction from the PDF text layer.
    PdfToText,
    /// OCR using Tesseract.
    TesseractOcr,
    /// pdftotext with OCR fallback for sparse pages.
    Hybrid,
}

/// Structured metadata extracted alongside document text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Document title, when the format carries one.
    pub title: Option<String>,
    /// Number of pages processed (for paginated formats).
    pub page_count: Option<u32>,
    /// Number of pages that fell back to OCR.
    pub ocr_pages: u32,
}
