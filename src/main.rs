//! textmill - document text extraction with result caching.
//!
//! Extracts text and tables from documents via external tools, with an
//! on-disk result cache and crash-isolated table detection.

use textmill::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity. Logs go to stderr: stdout
    // carries extraction output, and in worker mode the result message.
    let default_filter = if cli::is_verbose() {
        "textmill=info"
    } else {
        "textmill=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Run CLI
    cli::run().await
}
