//! Plain text and markdown extraction.

use std::fs;
use std::path::Path;

use super::ExtractionError;
use crate::models::{ExtractionMethod, ExtractionResult};

/// Read a text-family file directly. Invalid UTF-8 is replaced rather than
/// rejected; these files come from the wild.
pub fn extract_text_file(path: &Path, mime_type: &str) -> Result<ExtractionResult, ExtractionError> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();

    let mut result = ExtractionResult::new(content, mime_type.to_string(), ExtractionMethod::PlainText);
    if mime_type == "text/markdown" {
        result.metadata.title = markdown_title(&result.content);
    }
    Ok(result)
}

/// First ATX heading in a markdown document, as a title.
fn markdown_title(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let trimmed = line.trim_start();
        trimmed
            .strip_prefix('#')
            .map(|rest| rest.trim_start_matches('#').trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_plain_text_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello world\n").unwrap();

        let result = extract_text_file(&path, "text/plain").unwrap();
        assert_eq!(result.content, "hello world\n");
        assert_eq!(result.method, ExtractionMethod::PlainText);
        assert!(result.metadata.title.is_none());
    }

    #[test]
    fn test_markdown_title() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "preamble\n\n## Quarterly Report\n\nbody\n").unwrap();

        let result = extract_text_file(&path, "text/markdown").unwrap();
        assert_eq!(result.metadata.title.as_deref(), Some("Quarterly Report"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, [b'o', b'k', 0xff, 0xfe, b'!']).unwrap();

        let result = extract_text_file(&path, "text/plain").unwrap();
        assert!(result.content.starts_with("ok"));
        assert!(result.content.ends_with('!'));
    }
}
