//! textmill - document text extraction with result caching.
//!
//! Normalizes heterogeneous inputs (PDF, DOCX, HTML, images, plain text)
//! into plain text/markdown plus structured metadata, using external tools
//! (pandoc, poppler, tesseract) as backends. Expensive results are cached
//! on disk per namespace, concurrent in-process requests for the same work
//! are coalesced, and crash-prone table detection can run in an isolated
//! child process with a hard timeout.

pub mod cache;
pub mod cli;
pub mod config;
pub mod extract;
pub mod isolated;
pub mod models;

pub use cache::{CacheManager, CachePayload, CacheStore};
pub use config::{CacheNamespace, CacheSettings, ExtractionConfig, TableConfig};
pub use extract::{ExtractionError, Extractor};
pub use isolated::{IsolatedExecutor, TableJob, WorkerError};
pub use models::{ExtractionResult, TableFrame, TableRecord};
