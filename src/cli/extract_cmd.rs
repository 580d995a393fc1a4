//! `textmill extract` implementation.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cache::CacheManager;
use crate::config::{env_flag, ExtractionConfig};
use crate::extract::Extractor;
use crate::models::ExtractionResult;

#[allow(clippy::too_many_arguments)]
pub async fn run_extract(
    files: Vec<PathBuf>,
    tables: bool,
    isolated: bool,
    ocr_language: String,
    no_cache: bool,
    json: bool,
    workers: usize,
) -> anyhow::Result<()> {
    let config = ExtractionConfig {
        extract_tables: tables,
        isolated_tables: isolated || env_flag("TEXTMILL_TABLES_ISOLATED"),
        ocr_language,
        use_cache: !no_cache,
        ..ExtractionConfig::default()
    };

    let caches = Arc::new(CacheManager::from_env()?);
    let extractor = Arc::new(Extractor::new(caches, config));
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));

    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let extractor = Arc::clone(&extractor);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            let result = extractor.extract_file(&path).await;
            (path, result)
        }));
    }

    let mut failures = 0usize;
    for handle in handles {
        let (path, result) = handle.await?;
        match result {
            Ok(result) => print_result(&path, &result, json)?,
            Err(e) => {
                failures += 1;
                tracing::error!("extraction failed for {}: {}", path.display(), e);
                eprintln!("error: {}: {}", path.display(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} file(s) failed to extract", failures);
    }
    Ok(())
}

fn print_result(path: &std::path::Path, result: &ExtractionResult, json: bool) -> anyhow::Result<()> {
    if json {
        #[derive(serde::Serialize)]
        struct JsonResult<'a> {
            path: &'a std::path::Path,
            #[serde(flatten)]
            result: &'a ExtractionResult,
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonResult { path, result })?
        );
        return Ok(());
    }

    println!("==> {}", path.display());
    println!("{}", result.content);
    for table in &result.tables {
        println!("--- table (page {}) ---", table.page_number);
        println!("{}", table.text);
    }
    Ok(())
}
