//! Binary encoding of cache payloads.
//!
//! Payloads are a closed set of tagged variants wrapped in a versioned
//! envelope. Table frames are stored as CSV text instead of a Rust-specific
//! encoding, so cached table results remain portable across versions of this
//! crate (and inspectable by other tooling).

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::CacheError;
use crate::models::{ExtractionResult, TableFrame, TableRecord};

/// Envelope format version. Bump on any incompatible layout change; decode
/// rejects entries with a different version so they degrade to cache misses.
const ENVELOPE_VERSION: u32 = 1;

/// A value that can be stored in the cache.
///
/// The closed variant set replaces duck-typed dispatch: every payload shape
/// has an explicit encoding, and a value with no variant simply cannot be
/// constructed, so nothing is ever silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachePayload {
    /// A bare string result (OCR page text, a MIME type).
    Text(String),
    /// A whole-document extraction result.
    Document(ExtractionResult),
    /// Table extraction results.
    Tables(Vec<TableRecord>),
}

impl CachePayload {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_document(self) -> Option<ExtractionResult> {
        match self {
            Self::Document(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_tables(self) -> Option<Vec<TableRecord>> {
        match self {
            Self::Tables(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    /// Unix timestamp of the write, for stats and debugging. Eviction uses
    /// file mtimes, not this field.
    created_at: i64,
    payload: StoredPayload,
}

/// On-disk payload representation. Table records swap their in-memory frame
/// for CSV text; everything else is stored as-is.
#[derive(Serialize, Deserialize)]
enum StoredPayload {
    Text(String),
    Document(StoredDocument),
    Tables(Vec<StoredTable>),
}

/// `ExtractionResult` with its tables swapped for their portable form.
#[derive(Serialize, Deserialize)]
struct StoredDocument {
    content: String,
    mime_type: String,
    method: crate::models::ExtractionMethod,
    metadata: crate::models::DocumentMetadata,
    tables: Vec<StoredTable>,
}

#[derive(Serialize, Deserialize)]
struct StoredTable {
    page_number: u32,
    text: String,
    image_png: Option<Vec<u8>>,
    frame_csv: String,
}

impl From<&TableRecord> for StoredTable {
    fn from(record: &TableRecord) -> Self {
        Self {
            page_number: record.page_number,
            text: record.text.clone(),
            image_png: record.image_png.clone(),
            frame_csv: record.frame.to_csv(),
        }
    }
}

impl StoredTable {
    fn into_record(self) -> Result<TableRecord, CacheError> {
        let frame = TableFrame::from_csv(&self.frame_csv).ok_or_else(|| {
            CacheError::Serialization("malformed CSV frame in cached table".to_string())
        })?;
        Ok(TableRecord {
            page_number: self.page_number,
            text: self.text,
            image_png: self.image_png,
            frame,
        })
    }
}

fn to_stored(payload: &CachePayload) -> StoredPayload {
    match payload {
        CachePayload::Text(s) => StoredPayload::Text(s.clone()),
        CachePayload::Document(result) => StoredPayload::Document(StoredDocument {
            content: result.content.clone(),
            mime_type: result.mime_type.clone(),
            method: result.method,
            metadata: result.metadata.clone(),
            tables: result.tables.iter().map(StoredTable::from).collect(),
        }),
        CachePayload::Tables(records) => {
            StoredPayload::Tables(records.iter().map(StoredTable::from).collect())
        }
    }
}

fn from_stored(stored: StoredPayload) -> Result<CachePayload, CacheError> {
    Ok(match stored {
        StoredPayload::Text(s) => CachePayload::Text(s),
        StoredPayload::Document(doc) => {
            let tables = doc
                .tables
                .into_iter()
                .map(StoredTable::into_record)
                .collect::<Result<Vec<_>, _>>()?;
            CachePayload::Document(ExtractionResult {
                content: doc.content,
                mime_type: doc.mime_type,
                method: doc.method,
                metadata: doc.metadata,
                tables,
            })
        }
        StoredPayload::Tables(tables) => CachePayload::Tables(
            tables
                .into_iter()
                .map(StoredTable::into_record)
                .collect::<Result<Vec<_>, _>>()?,
        ),
    })
}

/// Encode a payload into the versioned binary envelope.
pub fn encode(payload: &CachePayload) -> Result<Vec<u8>, CacheError> {
    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        created_at: Utc::now().timestamp(),
        payload: to_stored(payload),
    };
    bincode::serialize(&envelope)
        .map_err(|e| CacheError::Serialization(format!("encode failed: {}", e)))
}

/// Decode a payload from its binary envelope.
///
/// Fails on truncated or malformed input and on envelopes written by an
/// incompatible version. Returns the payload and its write timestamp.
pub fn decode(bytes: &[u8]) -> Result<(CachePayload, i64), CacheError> {
    let envelope: Envelope = bincode::deserialize(bytes)
        .map_err(|e| CacheError::Serialization(format!("decode failed: {}", e)))?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(CacheError::Serialization(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }
    Ok((from_stored(envelope.payload)?, envelope.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentMetadata, ExtractionMethod};

    fn sample_tables() -> Vec<TableRecord> {
        vec![TableRecord {
            page_number: 3,
            text: "| a | b |\n| --- | --- |\n| 1 | 2 |\n".to_string(),
            image_png: Some(vec![0x89, 0x50, 0x4e, 0x47]),
            frame: TableFrame {
                columns: vec!["a".to_string(), "b".to_string()],
                rows: vec![vec!["1".to_string(), "2".to_string()]],
            },
        }]
    }

    #[test]
    fn test_text_round_trip() {
        let payload = CachePayload::Text("application/pdf".to_string());
        let bytes = encode(&payload).unwrap();
        let (decoded, created_at) = decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
        assert!(created_at > 0);
    }

    #[test]
    fn test_document_round_trip_with_tables() {
        let mut result = ExtractionResult::new(
            "hello world".to_string(),
            "application/pdf".to_string(),
            ExtractionMethod::Hybrid,
        );
        result.metadata = DocumentMetadata {
            title: Some("Report".to_string()),
            page_count: Some(4),
            ocr_pages: 1,
        };
        result.tables = sample_tables();

        let payload = CachePayload::Document(result);
        let (decoded, _) = decode(&encode(&payload).unwrap()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_tables_round_trip() {
        let payload = CachePayload::Tables(sample_tables());
        let (decoded, _) = decode(&encode(&payload).unwrap()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode(b"not an envelope").is_err());
    }

    #[test]
    fn test_decode_truncated_fails() {
        let bytes = encode(&CachePayload::Text("x".repeat(256))).unwrap();
        assert!(decode(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_payload_accessors() {
        assert!(CachePayload::Text("t".to_string()).into_text().is_some());
        assert!(CachePayload::Text("t".to_string()).into_document().is_none());
        assert!(CachePayload::Tables(vec![]).into_tables().is_some());
    }
}
