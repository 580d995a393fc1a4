//! PDF text extraction: text layer first, OCR fallback for sparse pages.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::tool::{check_cmd_status, handle_cmd_output};
use super::{file_params, ExtractionError};
use crate::cache::{CachePayload, CacheStore, ParamValue};
use crate::models::{ExtractionMethod, ExtractionResult};

/// A text layer yielding fewer characters per page than this is considered
/// image-based and routed through OCR.
const SPARSE_CHARS_PER_PAGE: usize = 100;

/// Extract text from a PDF. Uses the embedded text layer when present;
/// falls back to page-wise Tesseract OCR when the layer is sparse. OCR
/// output is cached per page in `ocr_cache`.
pub fn extract_pdf(
    path: &Path,
    ocr_language: &str,
    ocr_cache: Option<&CacheStore>,
) -> Result<ExtractionResult, ExtractionError> {
    let text = run_pdftotext(path)?;
    let page_count = pdf_page_count(path).unwrap_or(1).max(1);

    let visible_chars = text.chars().filter(|c| !c.is_whitespace()).count();
    if visible_chars >= SPARSE_CHARS_PER_PAGE * page_count as usize {
        let mut result = ExtractionResult::new(
            text,
            "application/pdf".to_string(),
            ExtractionMethod::PdfToText,
        );
        result.metadata.page_count = Some(page_count);
        return Ok(result);
    }

    // Sparse text layer: OCR every page and join with form feeds, matching
    // pdftotext's page separator.
    let mut pages = Vec::with_capacity(page_count as usize);
    for page in 1..=page_count {
        pages.push(ocr_pdf_page_cached(path, page, ocr_language, ocr_cache)?);
    }

    let method = if visible_chars > 0 {
        ExtractionMethod::Hybrid
    } else {
        ExtractionMethod::TesseractOcr
    };
    let mut result = ExtractionResult::new(
        pages.join("\x0c"),
        "application/pdf".to_string(),
        method,
    );
    result.metadata.page_count = Some(page_count);
    result.metadata.ocr_pages = page_count;
    Ok(result)
}

/// OCR one PDF page, going through the OCR cache when one is provided.
/// Cache entries are keyed by file identity plus page and language.
pub fn ocr_pdf_page_cached(
    path: &Path,
    page: u32,
    language: &str,
    cache: Option<&CacheStore>,
) -> Result<String, ExtractionError> {
    let params = match cache {
        Some(_) => {
            let metadata = std::fs::metadata(path)?;
            let mut params = file_params(path, &metadata);
            params.push(("page", ParamValue::Int(page as i64)));
            params.push(("language", ParamValue::Str(language.to_string())));
            params
        }
        None => Vec::new(),
    };

    if let Some(cache) = cache {
        if let Some(text) = cache.get(&params).and_then(CachePayload::into_text) {
            return Ok(text);
        }
    }

    let temp_dir = TempDir::new()?;
    let image_path = pdf_page_to_image(path, page, temp_dir.path())?;
    let text = run_tesseract(&image_path, language)?;

    if let Some(cache) = cache {
        cache.set(&CachePayload::Text(text.clone()), &params);
    }
    Ok(text)
}

/// OCR a standalone image file.
pub fn ocr_image_file(path: &Path, language: &str) -> Result<String, ExtractionError> {
    run_tesseract(path, language)
}

/// Run pdftotext over the whole document, preserving layout.
pub(crate) fn run_pdftotext(path: &Path) -> Result<String, ExtractionError> {
    let output = Command::new("pdftotext")
        .args(["-layout", "-enc", "UTF-8"])
        .arg(path)
        .arg("-") // stdout
        .output();
    handle_cmd_output(output, "pdftotext (install poppler-utils)", "pdftotext failed")
}

/// Get the page count of a PDF via pdfinfo.
pub(crate) fn pdf_page_count(path: &Path) -> Option<u32> {
    let output = Command::new("pdfinfo").arg(path).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if line.starts_with("Pages:") {
            return line.split_whitespace().nth(1).and_then(|s| s.parse().ok());
        }
    }
    None
}

/// Render one PDF page to a PNG via pdftoppm.
fn pdf_page_to_image(
    pdf_path: &Path,
    page: u32,
    output_dir: &Path,
) -> Result<PathBuf, ExtractionError> {
    let page_str = page.to_string();
    let output_prefix = output_dir.join("page");

    let status = Command::new("pdftoppm")
        .args(["-png", "-r", "300", "-f", &page_str, "-l", &page_str])
        .arg(pdf_path)
        .arg(&output_prefix)
        .status();
    check_cmd_status(
        status,
        "pdftoppm (install poppler-utils)",
        "pdftoppm failed to convert PDF page",
    )?;

    find_page_image(output_dir, page).ok_or_else(|| {
        ExtractionError::ExtractionFailed(format!("No image generated for page {}", page))
    })
}

/// Find the image file for a specific page number.
/// pdftoppm names files like page-01.png, page-02.png, etc.
fn find_page_image(temp_path: &Path, page_num: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_num, width = digits);
        let path = temp_path.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Run Tesseract on an image file.
fn run_tesseract(image_path: &Path, language: &str) -> Result<String, ExtractionError> {
    let output = Command::new("tesseract")
        .arg(image_path)
        .arg("stdout")
        .args(["-l", language])
        .output();
    handle_cmd_output(output, "tesseract (install tesseract-ocr)", "tesseract failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_page_image_zero_padding() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page-03.png"), b"png").unwrap();
        assert_eq!(
            find_page_image(dir.path(), 3),
            Some(dir.path().join("page-03.png"))
        );
        assert_eq!(find_page_image(dir.path(), 4), None);
    }

    #[test]
    fn test_missing_pdf_errors() {
        let err = extract_pdf(Path::new("/nonexistent/a.pdf"), "eng", None).unwrap_err();
        // Either pdftotext is absent or it fails on the missing file.
        assert!(matches!(
            err,
            ExtractionError::ToolNotFound(_) | ExtractionError::ExtractionFailed(_)
        ));
    }
}
