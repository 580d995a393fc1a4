//! Table extraction result types.
//!
//! A detected table carries its cell data as a columnar [`TableFrame`] plus a
//! markdown rendering for text output. Frames convert to and from CSV so that
//! cached table results stay readable across versions.

use serde::{Deserialize, Serialize};

/// A single table detected in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    /// 1-based page number the table was found on.
    pub page_number: u32,
    /// Markdown rendering of the table.
    pub text: String,
    /// PNG image of the cropped table region, when the detector produces one.
    pub image_png: Option<Vec<u8>>,
    /// Columnar cell data.
    pub frame: TableFrame,
}

/// Columnar table data: a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableFrame {
    /// Column names (the table's header row).
    pub columns: Vec<String>,
    /// Data rows; each row has one cell per column.
    pub rows: Vec<Vec<String>>,
}

impl TableFrame {
    /// Render the frame as CSV (header row first).
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_csv_row(&mut out, &self.columns);
        for row in &self.rows {
            write_csv_row(&mut out, row);
        }
        out
    }

    /// Parse a frame from CSV produced by [`TableFrame::to_csv`].
    ///
    /// The first record is taken as the header. Returns `None` on input that
    /// is not well-formed CSV (e.g. an unterminated quoted field).
    pub fn from_csv(csv: &str) -> Option<Self> {
        let mut records = parse_csv(csv)?;
        if records.is_empty() {
            return Some(Self::default());
        }
        let columns = records.remove(0);
        Some(Self {
            columns,
            rows: records,
        })
    }

    /// Render the frame as a markdown pipe table.
    pub fn to_markdown(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        out.push_str("| ");
        out.push_str(&self.columns.join(" | "));
        out.push_str(" |\n|");
        for _ in &self.columns {
            out.push_str(" --- |");
        }
        out.push('\n');
        for row in &self.rows {
            out.push_str("| ");
            out.push_str(&row.join(" | "));
            out.push_str(" |\n");
        }
        out
    }
}

fn write_csv_row(out: &mut String, cells: &[String]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if cell.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

/// Minimal RFC 4180 CSV parser. Returns `None` on an unterminated quote.
fn parse_csv(input: &str) -> Option<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut chars = input.chars().peekable();
    let mut in_quotes = false;
    let mut saw_any = false;

    while let Some(c) = chars.next() {
        saw_any = true;
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cell.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => cell.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    row.push(std::mem::take(&mut cell));
                }
                '\r' => {}
                '\n' => {
                    row.push(std::mem::take(&mut cell));
                    records.push(std::mem::take(&mut row));
                }
                _ => cell.push(c),
            }
        }
    }

    if in_quotes {
        return None;
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        records.push(row);
    } else if saw_any && records.is_empty() {
        records.push(vec![String::new()]);
    }
    Some(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> TableFrame {
        TableFrame {
            columns: vec!["Name".to_string(), "Amount".to_string()],
            rows: vec![
                vec!["Widget".to_string(), "12".to_string()],
                vec!["Gadget, large".to_string(), "3".to_string()],
            ],
        }
    }

    #[test]
    fn test_csv_round_trip() {
        let frame = sample_frame();
        let csv = frame.to_csv();
        let parsed = TableFrame::from_csv(&csv).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_csv_round_trip_quotes_and_newlines() {
        let frame = TableFrame {
            columns: vec!["a".to_string(), "b\"c".to_string()],
            rows: vec![vec!["line1\nline2".to_string(), "plain".to_string()]],
        };
        let parsed = TableFrame::from_csv(&frame.to_csv()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_csv_empty_frame() {
        let frame = TableFrame::default();
        let parsed = TableFrame::from_csv(&frame.to_csv()).unwrap();
        assert_eq!(parsed.rows.len(), 0);
    }

    #[test]
    fn test_csv_unterminated_quote() {
        assert!(TableFrame::from_csv("a,\"b\nc,d").is_none());
    }

    #[test]
    fn test_markdown_render() {
        let md = sample_frame().to_markdown();
        assert!(md.starts_with("| Name | Amount |\n| --- | --- |\n"));
        assert!(md.contains("| Widget | 12 |"));
    }
}
