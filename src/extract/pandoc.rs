//! Office and markup format conversion via pandoc.

use std::path::Path;
use std::process::Command;

use super::tool::{check_binary, handle_cmd_output};
use super::ExtractionError;
use crate::models::{ExtractionMethod, ExtractionResult};

/// Minimum supported pandoc major version.
const PANDOC_MIN_MAJOR: u32 = 2;

/// Map a MIME type to pandoc's `--from` format name, when pandoc handles it.
pub fn pandoc_from_format(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "application/vnd.oasis.opendocument.text" => Some("odt"),
        "text/html" => Some("html"),
        "application/epub+zip" => Some("epub"),
        "application/rtf" | "text/rtf" => Some("rtf"),
        "application/x-latex" | "text/x-tex" => Some("latex"),
        "text/x-rst" => Some("rst"),
        _ => None,
    }
}

/// Convert a document to markdown with pandoc.
pub fn extract_with_pandoc(
    path: &Path,
    mime_type: &str,
    from_format: &str,
) -> Result<ExtractionResult, ExtractionError> {
    ensure_pandoc()?;

    let output = Command::new("pandoc")
        .args(["--from", from_format, "--to", "markdown"])
        .arg(path)
        .output();
    let content = handle_cmd_output(output, "pandoc (install pandoc)", "pandoc failed")?;

    Ok(ExtractionResult::new(
        content,
        mime_type.to_string(),
        ExtractionMethod::Pandoc,
    ))
}

/// Verify pandoc is installed and new enough.
fn ensure_pandoc() -> Result<(), ExtractionError> {
    if !check_binary("pandoc") {
        return Err(ExtractionError::ToolNotFound(
            "pandoc (install pandoc)".to_string(),
        ));
    }

    let output = Command::new("pandoc").arg("--version").output();
    let version_text = handle_cmd_output(output, "pandoc", "pandoc --version failed")?;
    match parse_major_version(&version_text) {
        Some(major) if major >= PANDOC_MIN_MAJOR => Ok(()),
        Some(major) => Err(ExtractionError::ExtractionFailed(format!(
            "pandoc version {} is too old (need >= {})",
            major, PANDOC_MIN_MAJOR
        ))),
        None => Err(ExtractionError::ExtractionFailed(
            "could not parse pandoc version".to_string(),
        )),
    }
}

/// Parse the major version out of `pandoc --version` output
/// (first line looks like `pandoc 3.1.11`).
fn parse_major_version(version_output: &str) -> Option<u32> {
    version_output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)?
        .split('.')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_format_mapping() {
        assert_eq!(
            pandoc_from_format(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            Some("docx")
        );
        assert_eq!(pandoc_from_format("text/html"), Some("html"));
        assert_eq!(pandoc_from_format("application/pdf"), None);
    }

    #[test]
    fn test_parse_major_version() {
        assert_eq!(parse_major_version("pandoc 3.1.11\nCompiled with..."), Some(3));
        assert_eq!(parse_major_version("pandoc 2.19"), Some(2));
        assert_eq!(parse_major_version("pandoc.exe 2.5"), Some(2));
        assert_eq!(parse_major_version("gibberish"), None);
        assert_eq!(parse_major_version(""), None);
    }
}
