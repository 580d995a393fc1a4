//! Extraction orchestration: MIME dispatch, caching, and coalescing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{file_params, mime, pandoc, pdf, tables, text, ExtractionError};
use crate::cache::{CacheManager, CachePayload, ParamValue};
use crate::config::ExtractionConfig;
use crate::isolated::{IsolatedExecutor, TableJob};
use crate::models::{ExtractionMethod, ExtractionResult, TableRecord};

/// Orchestrates document extraction: detects the MIME type, dispatches to a
/// backend, and wraps the result in the caching layer. Whole-document
/// results are cached under path + size + mtime + config, with in-process
/// single-flight coalescing so concurrent requests for the same document do
/// the work once.
pub struct Extractor {
    caches: Arc<CacheManager>,
    config: ExtractionConfig,
    executor: IsolatedExecutor,
}

impl Extractor {
    pub fn new(caches: Arc<CacheManager>, config: ExtractionConfig) -> Self {
        Self {
            caches,
            config,
            executor: IsolatedExecutor::new(),
        }
    }

    /// Replace the worker executor (tests use stand-in commands).
    pub fn with_executor(mut self, executor: IsolatedExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract one file, going through the documents cache unless caching is
    /// disabled.
    pub async fn extract_file(&self, path: &Path) -> Result<ExtractionResult, ExtractionError> {
        let metadata = fs::metadata(path)?;

        let mime_type = if self.config.use_cache {
            mime::detect_mime_cached(path, &self.caches.mime)?
        } else {
            mime::detect_mime(path)?
        };

        if !self.config.use_cache {
            return self.compute(path, &mime_type).await;
        }

        let mut params = file_params(path, &metadata);
        params.push((
            "config",
            ParamValue::Tagged {
                type_name: "ExtractionConfig".to_string(),
                display: self.config.canonical_string(),
            },
        ));

        let payload = self
            .caches
            .documents
            .get_or_compute_async(&params, || async {
                self.compute(path, &mime_type)
                    .await
                    .map(CachePayload::Document)
            })
            .await?;

        payload.into_document().ok_or_else(|| {
            ExtractionError::ExtractionFailed(
                "unexpected payload shape in documents cache".to_string(),
            )
        })
    }

    /// Run the actual extraction, bypassing the documents cache. Blocking
    /// tool invocations are offloaded to the blocking thread pool.
    async fn compute(&self, path: &Path, mime_type: &str) -> Result<ExtractionResult, ExtractionError> {
        let mut result = self.extract_content(path, mime_type).await?;
        if self.config.extract_tables && mime_type == "application/pdf" {
            result.tables = self.extract_tables(path).await?;
        }
        Ok(result)
    }

    async fn extract_content(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        let owned_path = path.to_path_buf();
        let mime = mime_type.to_string();

        if mime_type == "application/pdf" {
            let language = self.config.ocr_language.clone();
            let ocr_cache = self.config.use_cache.then(|| Arc::clone(&self.caches.ocr));
            return tokio::task::spawn_blocking(move || {
                pdf::extract_pdf(&owned_path, &language, ocr_cache.as_deref())
            })
            .await
            .map_err(join_error)?;
        }

        if mime_type.starts_with("text/")
            || mime_type == "application/json"
            || mime_type == "application/xml"
        {
            // HTML goes through pandoc for markdown output; other text
            // formats are read directly.
            if let Some(from_format) = pandoc::pandoc_from_format(mime_type) {
                return tokio::task::spawn_blocking(move || {
                    pandoc::extract_with_pandoc(&owned_path, &mime, from_format)
                })
                .await
                .map_err(join_error)?;
            }
            return tokio::task::spawn_blocking(move || text::extract_text_file(&owned_path, &mime))
                .await
                .map_err(join_error)?;
        }

        if let Some(from_format) = pandoc::pandoc_from_format(mime_type) {
            return tokio::task::spawn_blocking(move || {
                pandoc::extract_with_pandoc(&owned_path, &mime, from_format)
            })
            .await
            .map_err(join_error)?;
        }

        if mime_type.starts_with("image/") {
            let language = self.config.ocr_language.clone();
            let content = tokio::task::spawn_blocking(move || {
                pdf::ocr_image_file(&owned_path, &language)
            })
            .await
            .map_err(join_error)??;
            return Ok(ExtractionResult::new(
                content,
                mime,
                ExtractionMethod::TesseractOcr,
            ));
        }

        Err(ExtractionError::UnsupportedFileType(mime_type.to_string()))
    }

    /// Table extraction through the tables cache, optionally in an isolated
    /// child process. Worker failures propagate typed; they are never
    /// silently turned into "no tables".
    async fn extract_tables(&self, path: &Path) -> Result<Vec<TableRecord>, ExtractionError> {
        if !self.config.use_cache {
            return self.compute_tables(path.to_path_buf()).await;
        }

        let metadata = fs::metadata(path)?;
        let mut params = file_params(path, &metadata);
        params.push((
            "table_config",
            ParamValue::Tagged {
                type_name: "TableConfig".to_string(),
                display: format!(
                    "min_rows={};min_columns={}",
                    self.config.table_config.min_rows, self.config.table_config.min_columns
                ),
            },
        ));

        let payload = self
            .caches
            .tables
            .get_or_compute_async(&params, || async {
                self.compute_tables(path.to_path_buf())
                    .await
                    .map(CachePayload::Tables)
            })
            .await?;

        payload.into_tables().ok_or_else(|| {
            ExtractionError::ExtractionFailed(
                "unexpected payload shape in tables cache".to_string(),
            )
        })
    }

    async fn compute_tables(&self, path: PathBuf) -> Result<Vec<TableRecord>, ExtractionError> {
        if self.config.isolated_tables {
            let job = TableJob {
                file_path: path,
                config: self.config.table_config.clone(),
            };
            let timeout = Duration::from_secs(self.config.worker_timeout_secs);
            return Ok(self.executor.run_async(job, timeout).await?);
        }

        let config = self.config.table_config.clone();
        tokio::task::spawn_blocking(move || tables::detect_tables(&path, &config))
            .await
            .map_err(join_error)?
    }

}

fn join_error(e: tokio::task::JoinError) -> ExtractionError {
    ExtractionError::ExtractionFailed(format!("extraction task failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn extractor_in(dir: &Path, config: ExtractionConfig) -> Extractor {
        let caches = Arc::new(CacheManager::with_root(&dir.join("cache")).unwrap());
        Extractor::new(caches, config)
    }

    #[tokio::test]
    async fn test_extract_markdown_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, "# Title\n\nsome text\n").unwrap();

        let extractor = extractor_in(dir.path(), ExtractionConfig::default());
        let result = extractor.extract_file(&path).await.unwrap();
        assert_eq!(result.mime_type, "text/markdown");
        assert_eq!(result.method, ExtractionMethod::PlainText);
        assert_eq!(result.metadata.title.as_deref(), Some("Title"));
        assert!(result.tables.is_empty());
    }

    #[tokio::test]
    async fn test_second_extraction_hits_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "cached content").unwrap();

        let extractor = extractor_in(dir.path(), ExtractionConfig::default());
        let first = extractor.extract_file(&path).await.unwrap();

        // Rewrite the file with identical size and restore its mtime, so the
        // fingerprint is unchanged and the stale cached text is served.
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        fs::write(&path, "edited content").unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();

        let second = extractor.extract_file(&path).await.unwrap();
        assert_eq!(second.content, first.content);
        assert_eq!(second.content, "cached content");
    }

    #[tokio::test]
    async fn test_no_cache_recomputes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "first").unwrap();

        let config = ExtractionConfig {
            use_cache: false,
            ..ExtractionConfig::default()
        };
        let extractor = extractor_in(dir.path(), config);
        extractor.extract_file(&path).await.unwrap();
        assert_eq!(extractor.caches.documents.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_unsupported_type_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.zip");
        // Zip magic so content sniffing identifies it.
        fs::write(&path, [0x50, 0x4b, 0x03, 0x04, 0, 0, 0, 0]).unwrap();

        let extractor = extractor_in(dir.path(), ExtractionConfig::default());
        let err = extractor.extract_file(&path).await.unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFileType(_)));
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let dir = tempdir().unwrap();
        let extractor = extractor_in(dir.path(), ExtractionConfig::default());
        let err = extractor
            .extract_file(Path::new("/nonexistent/file.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io(_)));
    }
}
