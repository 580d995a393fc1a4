//! Content-addressed on-disk cache store.
//!
//! One file per entry, `<fingerprint>.bin`, holding the serializer's binary
//! envelope. The cache is a performance layer, never a correctness
//! requirement: every failure path degrades to "not cached" instead of
//! propagating. Writes go through a sibling temp file and an atomic rename,
//! so concurrent readers see either nothing or a complete entry.
//!
//! There is no cross-process locking. Two processes computing the same
//! fingerprint will both write; the last write wins, which is harmless
//! because entries for a fingerprint are interchangeable.

use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

use super::coalesce::{Claim, ProcessingRegistry};
use super::fingerprint::{fingerprint, ParamValue};
use super::serializer::{self, CachePayload};
use super::CacheError;
use crate::config::{CacheNamespace, CacheSettings};

/// File extension for cache entries.
const ENTRY_EXT: &str = "bin";

/// Size-eviction target as a fraction of the budget.
const EVICTION_TARGET_RATIO: f64 = 0.8;

/// A single cache namespace on disk.
pub struct CacheStore {
    namespace: CacheNamespace,
    settings: CacheSettings,
    registry: Arc<ProcessingRegistry>,
}

/// Read-only cache introspection. Never fails; filesystem errors zero the
/// counters instead.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub namespace: String,
    pub entry_count: usize,
    pub total_size_mb: f64,
    pub avg_entry_size_kb: f64,
    pub in_flight: usize,
    pub max_size_mb: f64,
    pub max_age_days: f64,
    pub cache_dir: PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) the namespace directory.
    pub fn new(namespace: CacheNamespace, settings: CacheSettings) -> Result<Self, CacheError> {
        fs::create_dir_all(&settings.cache_dir)?;
        Ok(Self {
            namespace,
            settings,
            registry: Arc::new(ProcessingRegistry::new()),
        })
    }

    pub fn namespace(&self) -> CacheNamespace {
        self.namespace
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// The coalescing registry for this namespace's fingerprints.
    pub fn registry(&self) -> &Arc<ProcessingRegistry> {
        &self.registry
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.settings
            .cache_dir
            .join(format!("{}.{}", fingerprint, ENTRY_EXT))
    }

    /// Look up a cached payload. Returns `None` on miss, expiry, or any
    /// read/decode failure; corrupt entries are deleted so the next write
    /// starts clean.
    pub fn get(&self, params: &[(&str, ParamValue)]) -> Option<CachePayload> {
        let fp = fingerprint(params);
        read_entry(&self.entry_path(&fp), self.settings.max_age_days)
    }

    /// Async lookup; file I/O runs on the blocking thread pool.
    pub async fn get_async(&self, params: &[(&str, ParamValue)]) -> Option<CachePayload> {
        let fp = fingerprint(params);
        let path = self.entry_path(&fp);
        let max_age_days = self.settings.max_age_days;
        tokio::task::spawn_blocking(move || read_entry(&path, max_age_days))
            .await
            .unwrap_or(None)
    }

    /// Store a payload. Best-effort: encode or write failures are logged at
    /// debug level and swallowed, since extraction already succeeded and the
    /// cache must never block it.
    pub fn set(&self, payload: &CachePayload, params: &[(&str, ParamValue)]) {
        let fp = fingerprint(params);
        let bytes = match serializer::encode(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("cache encode failed for {}: {}", fp, e);
                return;
            }
        };
        if let Err(e) = write_entry(&self.settings.cache_dir, &self.entry_path(&fp), &bytes) {
            tracing::debug!("cache write failed for {}: {}", fp, e);
            return;
        }
        self.maybe_evict(&fp);
    }

    /// Async store; encode happens on the caller, file I/O on the blocking
    /// thread pool.
    pub async fn set_async(&self, payload: &CachePayload, params: &[(&str, ParamValue)]) {
        let fp = fingerprint(params);
        let bytes = match serializer::encode(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("cache encode failed for {}: {}", fp, e);
                return;
            }
        };
        let dir = self.settings.cache_dir.clone();
        let path = self.entry_path(&fp);
        let settings = self.settings.clone();
        let fp_clone = fp.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Err(e) = write_entry(&dir, &path, &bytes) {
                tracing::debug!("cache write failed for {}: {}", fp_clone, e);
                return;
            }
            maybe_evict_for(&settings, &fp_clone);
        })
        .await;
    }

    /// Eviction sweep trigger, amortized: runs roughly once per
    /// `eviction_check_interval` writes, keyed off the fingerprint so the
    /// decision is cheap and deterministic for a given key.
    fn maybe_evict(&self, fingerprint: &str) {
        maybe_evict_for(&self.settings, fingerprint);
    }

    /// Delete stale entries, then trim oldest-first until total size is at
    /// most 80% of the budget. Individual file failures are skipped, never
    /// fatal. Returns `(removed_count, removed_mb)`.
    pub fn evict(&self) -> (usize, f64) {
        evict_dir(&self.settings)
    }

    /// Delete all entries unconditionally. Returns `(removed_count, removed_mb)`.
    pub fn clear(&self) -> (usize, f64) {
        let mut removed = 0;
        let mut removed_mb = 0.0;
        for entry in scan_entries(&self.settings.cache_dir) {
            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    removed += 1;
                    removed_mb += entry.size as f64 / (1024.0 * 1024.0);
                }
                Err(e) => tracing::debug!("failed to remove {:?}: {}", entry.path, e),
            }
        }
        (removed, removed_mb)
    }

    /// Read-only stats; never fails.
    pub fn stats(&self) -> CacheStats {
        let entries = scan_entries(&self.settings.cache_dir);
        let total_size: u64 = entries.iter().map(|e| e.size).sum();
        let count = entries.len();
        CacheStats {
            namespace: self.namespace.as_str().to_string(),
            entry_count: count,
            total_size_mb: total_size as f64 / (1024.0 * 1024.0),
            avg_entry_size_kb: if count > 0 {
                total_size as f64 / count as f64 / 1024.0
            } else {
                0.0
            },
            in_flight: self.registry.claimed_count(),
            max_size_mb: self.settings.max_size_mb,
            max_age_days: self.settings.max_age_days,
            cache_dir: self.settings.cache_dir.clone(),
        }
    }

    /// Single-flight read-through: return the cached payload, or compute it
    /// exactly once per process while concurrent callers for the same
    /// fingerprint wait.
    ///
    /// Protocol: cache check → claim → winner computes, stores, releases
    /// (release happens via guard even if `compute` panics) → waiters wake,
    /// re-check the cache, and claim again if the computation failed. The
    /// wait itself has no timeout; the computing path's own timeout is the
    /// bound.
    pub fn get_or_compute<E>(
        &self,
        params: &[(&str, ParamValue)],
        compute: impl FnOnce() -> Result<CachePayload, E>,
    ) -> Result<CachePayload, E> {
        let fp = fingerprint(params);
        let mut compute = Some(compute);
        loop {
            if let Some(payload) = read_entry(&self.entry_path(&fp), self.settings.max_age_days) {
                return Ok(payload);
            }
            match self.registry.claim(&fp) {
                Claim::Winner(_guard) => {
                    let compute = compute.take().expect("compute closure consumed twice");
                    let payload = compute()?;
                    self.set(&payload, params);
                    return Ok(payload);
                }
                Claim::Waiter(signal) => {
                    // Re-check the cache after waking; if the other caller
                    // failed we take over the computation ourselves.
                    signal.wait();
                }
            }
        }
    }

    /// Async single-flight read-through; same protocol as
    /// [`CacheStore::get_or_compute`] with all blocking waits offloaded.
    pub async fn get_or_compute_async<E, F, Fut>(
        &self,
        params: &[(&str, ParamValue)],
        compute: F,
    ) -> Result<CachePayload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachePayload, E>>,
    {
        let fp = fingerprint(params);
        let mut compute = Some(compute);
        loop {
            if let Some(payload) = self.get_async(params).await {
                return Ok(payload);
            }
            match self.registry.claim(&fp) {
                Claim::Winner(_guard) => {
                    let compute = compute.take().expect("compute closure consumed twice");
                    let payload = compute().await?;
                    self.set_async(&payload, params).await;
                    return Ok(payload);
                }
                Claim::Waiter(signal) => {
                    signal.wait_async().await;
                }
            }
        }
    }
}

#[derive(Debug)]
struct ScannedEntry {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

/// List cache entries in `dir`, skipping anything unreadable or foreign.
fn scan_entries(dir: &Path) -> Vec<ScannedEntry> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            tracing::debug!("failed to read cache directory {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("error reading cache entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some(ENTRY_EXT) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                tracing::debug!("no mtime for {:?}: {}", path, e);
                continue;
            }
        };
        entries.push(ScannedEntry {
            path,
            size: metadata.len(),
            modified,
        });
    }
    entries
}

fn is_entry_fresh(path: &Path, max_age_days: f64) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(elapsed) => elapsed.as_secs_f64() / 86_400.0 <= max_age_days,
        // mtime in the future: treat as fresh rather than evicting work.
        Err(_) => true,
    }
}

fn read_entry(path: &Path, max_age_days: f64) -> Option<CachePayload> {
    if !is_entry_fresh(path, max_age_days) {
        return None;
    }
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!("cache read failed for {:?}: {}", path, e);
            return None;
        }
    };
    match serializer::decode(&bytes) {
        Ok((payload, _created_at)) => Some(payload),
        Err(e) => {
            // Self-healing: a corrupt entry is deleted, not returned.
            tracing::debug!("corrupt cache entry {:?}: {}", path, e);
            if let Err(e) = fs::remove_file(path) {
                tracing::debug!("failed to remove corrupt entry {:?}: {}", path, e);
            }
            None
        }
    }
}

/// Write bytes to a sibling temp file, then rename into place so readers
/// never observe a partial entry.
fn write_entry(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path)
        .map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

fn maybe_evict_for(settings: &CacheSettings, fingerprint: &str) {
    let interval = settings.eviction_check_interval;
    if interval == 0 {
        return;
    }
    // The fingerprint is already a hash; its low bits are the sample.
    let sample = u64::from_str_radix(fingerprint, 16).unwrap_or(1);
    if sample % interval == 0 {
        evict_dir(settings);
    }
}

fn evict_dir(settings: &CacheSettings) -> (usize, f64) {
    let mut removed = 0;
    let mut removed_mb = 0.0;

    let now = SystemTime::now();
    let mut remaining = Vec::new();
    for entry in scan_entries(&settings.cache_dir) {
        let age_days = now
            .duration_since(entry.modified)
            .map(|d| d.as_secs_f64() / 86_400.0)
            .unwrap_or(0.0);
        if age_days > settings.max_age_days {
            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    removed += 1;
                    removed_mb += entry.size as f64 / (1024.0 * 1024.0);
                }
                Err(e) => tracing::debug!("failed to remove {:?}: {}", entry.path, e),
            }
        } else {
            remaining.push(entry);
        }
    }

    let mut total_mb: f64 = remaining
        .iter()
        .map(|e| e.size as f64 / (1024.0 * 1024.0))
        .sum();
    if total_mb > settings.max_size_mb {
        remaining.sort_by_key(|e| e.modified);
        let target_mb = settings.max_size_mb * EVICTION_TARGET_RATIO;
        for entry in remaining {
            if total_mb <= target_mb {
                break;
            }
            let size_mb = entry.size as f64 / (1024.0 * 1024.0);
            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    removed += 1;
                    removed_mb += size_mb;
                    total_mb -= size_mb;
                }
                Err(e) => tracing::debug!("failed to remove {:?}: {}", entry.path, e),
            }
        }
    }

    (removed, removed_mb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_store(dir: &Path) -> CacheStore {
        CacheStore::new(
            CacheNamespace::Documents,
            CacheSettings {
                cache_dir: dir.join("documents"),
                max_size_mb: 100.0,
                max_age_days: 30.0,
                eviction_check_interval: 0,
            },
        )
        .unwrap()
    }

    fn params_for(path: &str, size: i64, mtime: f64) -> Vec<(&'static str, ParamValue)> {
        vec![
            ("path", ParamValue::Str(path.to_string())),
            ("size", ParamValue::Int(size)),
            ("mtime", ParamValue::Float(mtime)),
        ]
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let params = params_for("/a.pdf", 10, 1000.0);
        store.set(&CachePayload::Text("hello".to_string()), &params);

        let hit = store.get(&params).unwrap();
        assert_eq!(hit, CachePayload::Text("hello".to_string()));

        // Different mtime, different fingerprint: miss.
        let other = params_for("/a.pdf", 10, 1000.1);
        assert!(store.get(&other).is_none());
    }

    #[test]
    fn test_get_never_set_is_absent() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        assert!(store.get(&params_for("/never.pdf", 1, 1.0)).is_none());
    }

    #[test]
    fn test_corrupt_entry_self_heals() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let params = params_for("/a.pdf", 10, 1000.0);
        store.set(&CachePayload::Text("hello".to_string()), &params);

        let fp = fingerprint(&params);
        let path = store.entry_path(&fp);
        fs::write(&path, b"garbage bytes that do not decode").unwrap();

        assert!(store.get(&params).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_expired_entry_is_miss() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        store.settings.max_age_days = 1.0;

        let params = params_for("/a.pdf", 10, 1000.0);
        store.set(&CachePayload::Text("hello".to_string()), &params);

        let path = store.entry_path(&fingerprint(&params));
        let two_days_ago = SystemTime::now() - Duration::from_secs(2 * 86_400);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(two_days_ago)
            .unwrap();

        assert!(store.get(&params).is_none());
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.set(
            &CachePayload::Text("a".to_string()),
            &params_for("/a.pdf", 1, 1.0),
        );
        store.set(
            &CachePayload::Text("b".to_string()),
            &params_for("/b.pdf", 2, 2.0),
        );

        let (removed, _) = store.clear();
        assert_eq!(removed, 2);
        assert!(store.get(&params_for("/a.pdf", 1, 1.0)).is_none());
        assert_eq!(store.stats().entry_count, 0);
    }

    #[test]
    fn test_evict_by_age() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        store.settings.max_age_days = 1.0;

        let fresh = params_for("/fresh.pdf", 1, 1.0);
        let stale = params_for("/stale.pdf", 2, 2.0);
        store.set(&CachePayload::Text("fresh".to_string()), &fresh);
        store.set(&CachePayload::Text("stale".to_string()), &stale);

        let stale_path = store.entry_path(&fingerprint(&stale));
        let old = SystemTime::now() - Duration::from_secs(3 * 86_400);
        File::options()
            .write(true)
            .open(&stale_path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let (removed, _) = store.evict();
        assert_eq!(removed, 1);
        assert!(!stale_path.exists());
        assert!(store.get(&fresh).is_some());
    }

    #[test]
    fn test_evict_by_size_oldest_first() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        // Budget of ~0.004 MB; each entry below is ~1 KB.
        store.settings.max_size_mb = 0.004;

        let payload = CachePayload::Text("x".repeat(1024));
        let mut paths = Vec::new();
        for i in 0..6i64 {
            let params = params_for("/f.pdf", i, i as f64);
            store.set(&payload, &params);
            let path = store.entry_path(&fingerprint(&params));
            // Stagger mtimes so "oldest" is well-defined.
            let mtime = SystemTime::now() - Duration::from_secs(600 - i as u64 * 60);
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
            paths.push(path);
        }

        store.evict();

        let total: u64 = scan_entries(&store.settings.cache_dir)
            .iter()
            .map(|e| e.size)
            .sum();
        assert!(total as f64 / (1024.0 * 1024.0) <= 0.004 * EVICTION_TARGET_RATIO + 1e-9);
        // The oldest entries are the ones that went.
        assert!(!paths[0].exists());
        assert!(paths[paths.len() - 1].exists());
    }

    #[test]
    fn test_stats_counts_entries() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.set(
            &CachePayload::Text("a".to_string()),
            &params_for("/a.pdf", 1, 1.0),
        );
        let stats = store.stats();
        assert_eq!(stats.namespace, "documents");
        assert_eq!(stats.entry_count, 1);
        assert!(stats.total_size_mb > 0.0);
        assert!(stats.avg_entry_size_kb > 0.0);
    }

    #[test]
    fn test_stats_on_missing_dir_is_zeroed() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        fs::remove_dir_all(&store.settings.cache_dir).unwrap();

        let stats = store.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.total_size_mb, 0.0);
    }

    #[test]
    fn test_single_flight_computes_once() {
        let dir = tempdir().unwrap();
        let store = Arc::new(test_store(dir.path()));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store
                        .get_or_compute::<()>(&params_for("/a.pdf", 10, 1000.0), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            // Hold the claim long enough for the others to queue.
                            thread::sleep(Duration::from_millis(100));
                            Ok(CachePayload::Text("computed".to_string()))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(
                handle.join().unwrap(),
                CachePayload::Text("computed".to_string())
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_compute_releases_claim() {
        let dir = tempdir().unwrap();
        let store = Arc::new(test_store(dir.path()));
        let params = params_for("/a.pdf", 10, 1000.0);

        let failed: Result<CachePayload, String> =
            store.get_or_compute(&params, || Err("backend exploded".to_string()));
        assert!(failed.is_err());
        assert!(!store.registry().is_claimed(&fingerprint(&params)));

        // A later caller is not blocked and can compute successfully.
        let ok: Result<CachePayload, String> =
            store.get_or_compute(&params, || Ok(CachePayload::Text("ok".to_string())));
        assert_eq!(ok.unwrap(), CachePayload::Text("ok".to_string()));
    }

    #[tokio::test]
    async fn test_async_get_set() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let params = params_for("/a.pdf", 10, 1000.0);

        store
            .set_async(&CachePayload::Text("hello".to_string()), &params)
            .await;
        let hit = store.get_async(&params).await.unwrap();
        assert_eq!(hit, CachePayload::Text("hello".to_string()));
    }

    #[tokio::test]
    async fn test_async_get_or_compute() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let params = params_for("/a.pdf", 10, 1000.0);

        let result: Result<CachePayload, ()> = store
            .get_or_compute_async(&params, || async {
                Ok(CachePayload::Text("computed".to_string()))
            })
            .await;
        assert_eq!(result.unwrap(), CachePayload::Text("computed".to_string()));

        // Second call hits the cache.
        let result: Result<CachePayload, ()> = store
            .get_or_compute_async(&params, || async { panic!("should not recompute") })
            .await;
        assert_eq!(result.unwrap(), CachePayload::Text("computed".to_string()));
    }

    #[test]
    fn test_probabilistic_eviction_is_tunable() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        store.settings.eviction_check_interval = 1; // every write
        store.settings.max_age_days = 0.0; // everything is instantly stale

        // mtime granularity makes age 0.0 for a fresh write, which is not
        // strictly greater than max_age_days; backdate to force staleness.
        let params = params_for("/a.pdf", 1, 1.0);
        store.set(&CachePayload::Text("a".to_string()), &params);
        let path = store.entry_path(&fingerprint(&params));
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(60))
            .unwrap();

        // This write triggers a sweep (interval 1) that removes the stale entry.
        store.set(
            &CachePayload::Text("b".to_string()),
            &params_for("/b.pdf", 2, 2.0),
        );
        assert!(!path.exists());
    }
}
