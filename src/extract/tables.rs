//! Table detection over pdftotext layout output.
//!
//! Scans each page for blocks of consecutive lines that share a stable
//! column structure when split on runs of whitespace. This routine is the
//! one the isolated worker executor runs: layout analysis over arbitrary
//! documents is the crash- and hang-prone part of the pipeline, so callers
//! usually reach it through [`crate::isolated::IsolatedExecutor`] rather
//! than directly.

use std::path::Path;

use super::pdf::run_pdftotext;
use super::ExtractionError;
use crate::config::TableConfig;
use crate::models::{TableFrame, TableRecord};

/// Minimum spaces between cells in layout output.
const CELL_GAP: &str = "  ";

/// Detect tables in a PDF.
pub fn detect_tables(path: &Path, config: &TableConfig) -> Result<Vec<TableRecord>, ExtractionError> {
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no such file: {}", path.display()),
        )
        .into());
    }
    let text = run_pdftotext(path)?;
    Ok(tables_from_layout_text(&text, config))
}

/// Detect tables in layout-preserved text. Pages are separated by form
/// feeds, as pdftotext emits them.
pub fn tables_from_layout_text(text: &str, config: &TableConfig) -> Vec<TableRecord> {
    let mut records = Vec::new();
    for (page_index, page) in text.split('\x0c').enumerate() {
        let page_number = page_index as u32 + 1;
        for block in column_blocks(page, config) {
            let mut rows = block;
            let columns = rows.remove(0);
            let frame = TableFrame { columns, rows };
            records.push(TableRecord {
                page_number,
                text: frame.to_markdown(),
                image_png: None,
                frame,
            });
        }
    }
    records
}

/// Group consecutive lines with the same cell count into candidate blocks.
fn column_blocks(page: &str, config: &TableConfig) -> Vec<Vec<Vec<String>>> {
    let mut blocks = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    let mut flush = |current: &mut Vec<Vec<String>>| {
        if current.len() >= config.min_rows {
            blocks.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    for line in page.lines() {
        let cells = split_cells(line);
        let fits = cells.len() >= config.min_columns
            && current
                .first()
                .map(|first| first.len() == cells.len())
                .unwrap_or(true);
        if fits {
            current.push(cells);
        } else {
            flush(&mut current);
            // A line with enough cells can start the next block immediately.
            if cells.len() >= config.min_columns {
                current.push(cells);
            }
        }
    }
    flush(&mut current);
    blocks
}

/// Split a layout line into cells on runs of two or more spaces.
fn split_cells(line: &str) -> Vec<String> {
    line.trim()
        .split(CELL_GAP)
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_WITH_TABLE: &str = "\
Some introductory paragraph text that is not a table.

Name          Amount    Status
Widget        12        shipped
Gadget        3         pending
Sprocket      44        shipped

Closing remarks.
";

    #[test]
    fn test_detects_aligned_block() {
        let records = tables_from_layout_text(PAGE_WITH_TABLE, &TableConfig::default());
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.page_number, 1);
        assert_eq!(record.frame.columns, vec!["Name", "Amount", "Status"]);
        assert_eq!(record.frame.rows.len(), 3);
        assert_eq!(record.frame.rows[1], vec!["Gadget", "3", "pending"]);
        assert!(record.text.contains("| Name | Amount | Status |"));
    }

    #[test]
    fn test_prose_is_not_a_table() {
        let text = "just a paragraph\nand another line\nno columns here\n";
        assert!(tables_from_layout_text(text, &TableConfig::default()).is_empty());
    }

    #[test]
    fn test_page_numbers_from_form_feeds() {
        let two_pages = format!("no table here\n\x0c{}", PAGE_WITH_TABLE);
        let records = tables_from_layout_text(&two_pages, &TableConfig::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].page_number, 2);
    }

    #[test]
    fn test_min_rows_threshold() {
        let config = TableConfig {
            min_rows: 5,
            min_columns: 2,
        };
        // Header + 3 rows = 4 lines, below the threshold.
        assert!(tables_from_layout_text(PAGE_WITH_TABLE, &config).is_empty());
    }

    #[test]
    fn test_column_count_change_splits_blocks() {
        let text = "\
a  b  c
d  e  f
g  h
i  j
";
        let records = tables_from_layout_text(text, &TableConfig::default());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].frame.columns.len(), 3);
        assert_eq!(records[1].frame.columns.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let err = detect_tables(Path::new("/nonexistent/a.pdf"), &TableConfig::default())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io(_)));
    }
}
