//! CLI parser and command dispatch.

mod cache_cmd;
mod extract_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "textmill")]
#[command(about = "Document text extraction with result caching")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text (and optionally tables) from documents
    Extract {
        /// Files to extract
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Detect tables in PDFs
        #[arg(long)]
        tables: bool,

        /// Run table detection in an isolated child process
        /// (also enabled by TEXTMILL_TABLES_ISOLATED=true)
        #[arg(long)]
        isolated: bool,

        /// Tesseract language for OCR fallback
        #[arg(long, default_value = "eng")]
        ocr_language: String,

        /// Bypass the result caches
        #[arg(long)]
        no_cache: bool,

        /// Emit results as JSON instead of plain text
        #[arg(long)]
        json: bool,

        /// Number of concurrent extractions
        #[arg(short, long, default_value = "4")]
        workers: usize,
    },

    /// Inspect and manage the result caches
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Internal: run one table-extraction job from stdin (spawned by the
    /// isolated executor; never invoked by hand)
    #[command(hide = true)]
    TableWorker,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show per-namespace cache statistics
    Stats {
        /// Emit stats as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all cached entries
    Clear {
        /// Only this namespace (ocr, documents, tables, mime)
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Run an eviction sweep (age, then size)
    Evict {
        /// Only this namespace (ocr, documents, tables, mime)
        #[arg(long)]
        namespace: Option<String>,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            files,
            tables,
            isolated,
            ocr_language,
            no_cache,
            json,
            workers,
        } => {
            extract_cmd::run_extract(
                files,
                tables,
                isolated,
                ocr_language,
                no_cache,
                json,
                workers,
            )
            .await
        }
        Commands::Cache { command } => match command {
            CacheCommands::Stats { json } => cache_cmd::run_stats(json),
            CacheCommands::Clear { namespace } => cache_cmd::run_clear(namespace.as_deref()),
            CacheCommands::Evict { namespace } => cache_cmd::run_evict(namespace.as_deref()),
        },
        Commands::TableWorker => {
            let stdin = std::io::stdin().lock();
            let stdout = std::io::stdout().lock();
            crate::isolated::run_table_worker(stdin, stdout)?;
            Ok(())
        }
    }
}
