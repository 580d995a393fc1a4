//! Wire protocol between the parent process and the table worker.
//!
//! One job goes in (JSON on stdin), exactly one message comes out (one JSON
//! line on stdout). Everything crossing the boundary is plain data: images
//! travel base64-encoded, frames as CSV text, and failures as a
//! `{message, kind, trace}` descriptor — never a live error value, which
//! cannot cross a process boundary.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::TableConfig;
use crate::models::{TableFrame, TableRecord};

/// Parameters for one isolated table-extraction job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableJob {
    /// Path to the PDF to scan.
    pub file_path: PathBuf,
    /// Detection thresholds.
    pub config: TableConfig,
}

/// Structured failure report from the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Human-readable failure message.
    pub message: String,
    /// Machine-readable failure kind (the error variant name).
    pub kind: String,
    /// Backtrace captured at the worker's catch boundary.
    pub trace: String,
}

/// The single message a worker writes before exiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerMessage {
    Ok { tables: Vec<WireTable> },
    Error { error: ErrorDescriptor },
}

/// A table record in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTable {
    pub page_number: u32,
    pub text: String,
    /// PNG bytes, base64-encoded for JSON transport.
    pub image_png: Option<String>,
    /// Columnar data as CSV.
    pub frame_csv: String,
}

impl From<&TableRecord> for WireTable {
    fn from(record: &TableRecord) -> Self {
        Self {
            page_number: record.page_number,
            text: record.text.clone(),
            image_png: record.image_png.as_deref().map(|b| BASE64.encode(b)),
            frame_csv: record.frame.to_csv(),
        }
    }
}

impl WireTable {
    /// Reconstruct the in-memory record, decoding the portable byte
    /// encodings.
    pub fn into_record(self) -> Result<TableRecord, String> {
        let image_png = match self.image_png {
            Some(b64) => Some(
                BASE64
                    .decode(b64.as_bytes())
                    .map_err(|e| format!("invalid base64 image: {}", e))?,
            ),
            None => None,
        };
        let frame = TableFrame::from_csv(&self.frame_csv)
            .ok_or_else(|| "malformed CSV frame".to_string())?;
        Ok(TableRecord {
            page_number: self.page_number,
            text: self.text,
            image_png,
            frame,
        })
    }
}
