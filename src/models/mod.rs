//! Core data types for extraction results.

mod document;
mod table;

pub use document::{DocumentMetadata, ExtractionMethod, ExtractionResult};
pub use table::{TableFrame, TableRecord};
