//! Configuration for caches and extraction.
//!
//! Cache budgets are configurable per namespace through `TEXTMILL_*`
//! environment variables; extraction behavior comes from CLI flags plus a few
//! environment toggles.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default timeout for isolated table-extraction workers, in seconds.
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 300;

/// Default number of writes between eviction sweeps.
pub const DEFAULT_EVICTION_CHECK_INTERVAL: u64 = 100;

/// Parse a boolean environment toggle: `true`, `1`, or `yes` (any case)
/// enable, anything else disables.
pub fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Logical cache namespaces, each with its own directory and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// Per-page OCR results. Large entries, stable inputs.
    Ocr,
    /// Whole-document extraction results. Churn faster than OCR output.
    Documents,
    /// Table extraction results with embedded images and frames.
    Tables,
    /// MIME detection results. Tiny entries, long-lived.
    Mime,
}

impl CacheNamespace {
    /// Directory name and env-var infix for this namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Documents => "documents",
            Self::Tables => "tables",
            Self::Mime => "mime",
        }
    }

    /// All namespaces, for iteration in CLI commands.
    pub fn all() -> [CacheNamespace; 4] {
        [Self::Ocr, Self::Documents, Self::Tables, Self::Mime]
    }

    /// Parse a namespace from its directory name.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ocr" => Some(Self::Ocr),
            "documents" => Some(Self::Documents),
            "tables" => Some(Self::Tables),
            "mime" => Some(Self::Mime),
            _ => None,
        }
    }

    fn env_infix(&self) -> &'static str {
        match self {
            Self::Ocr => "OCR",
            Self::Documents => "DOCUMENT",
            Self::Tables => "TABLE",
            Self::Mime => "MIME",
        }
    }

    fn default_size_mb(&self) -> f64 {
        match self {
            Self::Ocr => 500.0,
            Self::Documents => 1000.0,
            Self::Tables => 200.0,
            Self::Mime => 50.0,
        }
    }

    fn default_age_days(&self) -> f64 {
        match self {
            Self::Ocr => 30.0,
            Self::Documents => 7.0,
            Self::Tables => 30.0,
            Self::Mime => 60.0,
        }
    }
}

/// Settings for a single cache namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Directory holding this namespace's entries.
    pub cache_dir: PathBuf,
    /// Total size budget in MB; eviction trims to 80% of this.
    pub max_size_mb: f64,
    /// Entries older than this are stale and eligible for eviction.
    pub max_age_days: f64,
    /// Run an eviction sweep roughly once per this many writes (0 disables).
    pub eviction_check_interval: u64,
}

impl CacheSettings {
    /// Build settings for `namespace` from `TEXTMILL_*` environment variables,
    /// falling back to per-namespace defaults.
    ///
    /// Recognized variables: `TEXTMILL_CACHE_DIR` (root directory; the
    /// namespace name is appended), `TEXTMILL_<NS>_CACHE_SIZE_MB`,
    /// `TEXTMILL_<NS>_CACHE_AGE_DAYS`, and `TEXTMILL_EVICTION_CHECK_INTERVAL`.
    pub fn from_env(namespace: CacheNamespace) -> Self {
        let root = env::var("TEXTMILL_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".textmill"));
        let infix = namespace.env_infix();

        Self {
            cache_dir: root.join(namespace.as_str()),
            max_size_mb: env_f64(
                &format!("TEXTMILL_{}_CACHE_SIZE_MB", infix),
                namespace.default_size_mb(),
            ),
            max_age_days: env_f64(
                &format!("TEXTMILL_{}_CACHE_AGE_DAYS", infix),
                namespace.default_age_days(),
            ),
            eviction_check_interval: env_u64(
                "TEXTMILL_EVICTION_CHECK_INTERVAL",
                DEFAULT_EVICTION_CHECK_INTERVAL,
            ),
        }
    }

    /// Settings rooted at an explicit directory, with namespace defaults.
    /// Used by tests and embedders that do not want env lookups.
    pub fn with_root(namespace: CacheNamespace, root: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: root.into().join(namespace.as_str()),
            max_size_mb: namespace.default_size_mb(),
            max_age_days: namespace.default_age_days(),
            eviction_check_interval: DEFAULT_EVICTION_CHECK_INTERVAL,
        }
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Table detection thresholds passed to the (possibly isolated) detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Minimum rows (including header) for a block to count as a table.
    pub min_rows: usize,
    /// Minimum columns for a block to count as a table.
    pub min_columns: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
        }
    }
}

/// Extraction behavior for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Detect tables in PDFs.
    pub extract_tables: bool,
    /// Table detection thresholds.
    pub table_config: TableConfig,
    /// Run table detection in an isolated child process.
    pub isolated_tables: bool,
    /// Wall-clock timeout for isolated workers, in seconds.
    pub worker_timeout_secs: u64,
    /// Tesseract language for OCR fallback.
    pub ocr_language: String,
    /// Use the on-disk result caches.
    pub use_cache: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            extract_tables: false,
            table_config: TableConfig::default(),
            isolated_tables: env_flag("TEXTMILL_TABLES_ISOLATED"),
            worker_timeout_secs: DEFAULT_WORKER_TIMEOUT_SECS,
            ocr_language: "eng".to_string(),
            use_cache: true,
        }
    }
}

impl ExtractionConfig {
    /// Canonical string form of this config, used as a fingerprint parameter.
    ///
    /// JSON with struct-declaration field order: deterministic for a given
    /// build, and any semantic change to the config changes the string.
    pub fn canonical_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
