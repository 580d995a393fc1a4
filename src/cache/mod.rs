//! On-disk result caching.
//!
//! Extraction results are cached per namespace (OCR pages, whole documents,
//! tables, MIME types) under fingerprints derived from the computation's
//! parameters. Within a process, the coalescing registry guarantees at most
//! one computation per fingerprint at a time.

mod coalesce;
mod fingerprint;
mod serializer;
mod store;

pub use coalesce::{Claim, ClaimGuard, CompletionSignal, ProcessingRegistry};
pub use fingerprint::{fingerprint, ParamValue, EMPTY_FINGERPRINT, FINGERPRINT_LEN};
pub use serializer::{decode, encode, CachePayload};
pub use store::{CacheStats, CacheStore};

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{CacheNamespace, CacheSettings};

/// Errors internal to the cache layer.
///
/// These rarely escape: lookups degrade to misses and writes are
/// best-effort. Only cache construction and direct serializer use surface
/// them.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// All cache namespaces for one process, constructor-injected wherever
/// caching is needed (no global singletons, so tests get isolated state).
pub struct CacheManager {
    pub ocr: Arc<CacheStore>,
    pub documents: Arc<CacheStore>,
    pub tables: Arc<CacheStore>,
    pub mime: Arc<CacheStore>,
}

impl CacheManager {
    /// Build all namespaces from `TEXTMILL_*` environment variables.
    pub fn from_env() -> Result<Self, CacheError> {
        Self::build(CacheSettings::from_env)
    }

    /// Build all namespaces under an explicit root directory with default
    /// budgets. Used by tests and embedders.
    pub fn with_root(root: &Path) -> Result<Self, CacheError> {
        let root = root.to_path_buf();
        Self::build(move |ns| CacheSettings::with_root(ns, &root))
    }

    fn build(settings: impl Fn(CacheNamespace) -> CacheSettings) -> Result<Self, CacheError> {
        Ok(Self {
            ocr: Arc::new(CacheStore::new(
                CacheNamespace::Ocr,
                settings(CacheNamespace::Ocr),
            )?),
            documents: Arc::new(CacheStore::new(
                CacheNamespace::Documents,
                settings(CacheNamespace::Documents),
            )?),
            tables: Arc::new(CacheStore::new(
                CacheNamespace::Tables,
                settings(CacheNamespace::Tables),
            )?),
            mime: Arc::new(CacheStore::new(
                CacheNamespace::Mime,
                settings(CacheNamespace::Mime),
            )?),
        })
    }

    /// Namespace stores in a fixed order, for CLI iteration.
    pub fn all(&self) -> [&Arc<CacheStore>; 4] {
        [&self.ocr, &self.documents, &self.tables, &self.mime]
    }

    /// The store for a namespace.
    pub fn store(&self, namespace: CacheNamespace) -> &Arc<CacheStore> {
        match namespace {
            CacheNamespace::Ocr => &self.ocr,
            CacheNamespace::Documents => &self.documents,
            CacheNamespace::Tables => &self.tables,
            CacheNamespace::Mime => &self.mime,
        }
    }

    /// Clear every namespace. Returns total `(removed_count, removed_mb)`.
    pub fn clear_all(&self) -> (usize, f64) {
        let mut removed = 0;
        let mut removed_mb = 0.0;
        for store in self.all() {
            let (count, mb) = store.clear();
            removed += count;
            removed_mb += mb;
        }
        (removed, removed_mb)
    }

    /// Stats for every namespace.
    pub fn stats_all(&self) -> Vec<CacheStats> {
        self.all().iter().map(|store| store.stats()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_manager_namespaces_are_separate_dirs() {
        let dir = tempdir().unwrap();
        let manager = CacheManager::with_root(dir.path()).unwrap();

        let params = vec![("path", ParamValue::Str("/a.pdf".to_string()))];
        manager
            .ocr
            .set(&CachePayload::Text("ocr text".to_string()), &params);

        // Same params, different namespace: independent entries.
        assert!(manager.documents.get(&params).is_none());
        assert!(manager.ocr.get(&params).is_some());
    }

    #[test]
    fn test_clear_all() {
        let dir = tempdir().unwrap();
        let manager = CacheManager::with_root(dir.path()).unwrap();

        let params = vec![("k", ParamValue::Str("v".to_string()))];
        manager.ocr.set(&CachePayload::Text("a".to_string()), &params);
        manager
            .tables
            .set(&CachePayload::Tables(vec![]), &params);

        let (removed, _) = manager.clear_all();
        assert_eq!(removed, 2);
        assert!(manager.ocr.get(&params).is_none());
    }

    #[test]
    fn test_stats_all_covers_namespaces() {
        let dir = tempdir().unwrap();
        let manager = CacheManager::with_root(dir.path()).unwrap();
        let stats = manager.stats_all();
        assert_eq!(stats.len(), 4);
        let names: Vec<_> = stats.iter().map(|s| s.namespace.as_str()).collect();
        assert_eq!(names, vec!["ocr", "documents", "tables", "mime"]);
    }
}
