//! Main entry point for the gcs-source-fetcher CLI.

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use gcs_source_fetcher::cli::{self, Cli};

/// Initialize tracing subscriber with optional JSON formatting.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gcs_source_fetcher=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    match cli.execute().await {
        Ok(stats) if stats.success => {}
        Ok(stats) => {
            for err in &stats.errs {
                error!("{err}");
            }
            error!(failures = stats.errs.len(), "source fetch completed with failures");
            std::process::exit(1);
        }
        Err(err) => {
            error!("{err}");
            std::process::exit(cli::exit_code(&err));
        }
    }
}
