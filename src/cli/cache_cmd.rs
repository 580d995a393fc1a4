//! `textmill cache` subcommands.

use std::sync::Arc;

use crate::cache::{CacheManager, CacheStore};
use crate::config::CacheNamespace;

pub fn run_stats(json: bool) -> anyhow::Result<()> {
    let caches = CacheManager::from_env()?;
    let stats = caches.stats_all();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    for s in stats {
        println!(
            "{:<10} {:>6} entries  {:>10.2} MB used / {:.0} MB budget  (avg {:.1} KB, max age {:.0}d, {} in flight)",
            s.namespace,
            s.entry_count,
            s.total_size_mb,
            s.max_size_mb,
            s.avg_entry_size_kb,
            s.max_age_days,
            s.in_flight,
        );
        println!("           {}", s.cache_dir.display());
    }
    Ok(())
}

pub fn run_clear(namespace: Option<&str>) -> anyhow::Result<()> {
    let caches = CacheManager::from_env()?;
    let (removed, removed_mb) = match resolve(&caches, namespace)? {
        Some(store) => store.clear(),
        None => caches.clear_all(),
    };
    println!("removed {} entries ({:.2} MB)", removed, removed_mb);
    Ok(())
}

pub fn run_evict(namespace: Option<&str>) -> anyhow::Result<()> {
    let caches = CacheManager::from_env()?;
    let stores: Vec<&Arc<CacheStore>> = match resolve(&caches, namespace)? {
        Some(store) => vec![store],
        None => caches.all().to_vec(),
    };

    let mut removed = 0usize;
    let mut removed_mb = 0.0f64;
    for store in stores {
        let (count, mb) = store.evict();
        removed += count;
        removed_mb += mb;
    }
    println!("evicted {} entries ({:.2} MB)", removed, removed_mb);
    Ok(())
}

fn resolve<'a>(
    caches: &'a CacheManager,
    namespace: Option<&str>,
) -> anyhow::Result<Option<&'a Arc<CacheStore>>> {
    match namespace {
        None => Ok(None),
        Some(name) => {
            let ns = CacheNamespace::from_str_opt(name)
                .ok_or_else(|| anyhow::anyhow!("unknown cache namespace: {}", name))?;
            Ok(Some(caches.store(ns)))
        }
    }
}
