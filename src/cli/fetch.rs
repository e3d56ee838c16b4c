//! Flag parsing and run wiring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use crate::fetcher::{FetchError, Fetcher, FetcherConfig, JobStats};
use crate::storage::{GcsClient, GcsObject};
use crate::vfs::RealFs;

/// Upper bound on download workers to keep a misconfigured CI step from
/// opening thousands of concurrent reads.
const MAX_WORKERS: usize = 64;

/// Staging directory name used when none is given, placed inside the
/// destination directory.
const DEFAULT_STAGING_DIR: &str = ".staging";

/// Ingestion shape of the source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceType {
    /// JSON manifest mapping local filenames to `gs://` URLs.
    Manifest,
    /// Zip archive expanded into the destination.
    Zip,
    /// Gzipped tarball expanded into the destination.
    TarGz,
}

/// Download a build's source tree from Google Cloud Storage.
#[derive(Debug, Parser)]
#[command(name = "gcs-source-fetcher")]
#[command(about = "Fetch build sources from Google Cloud Storage", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Source object, e.g. gs://my-bucket/manifest.json#1234567890
    #[arg(long, value_parser = parse_gcs_url)]
    pub source: GcsObject,

    /// Ingestion shape of the source object
    #[arg(long = "type", value_enum, default_value_t = SourceType::Manifest)]
    pub source_type: SourceType,

    /// Destination working directory
    #[arg(long, default_value = ".")]
    pub dest_dir: PathBuf,

    /// Private staging directory (defaults to .staging inside the destination)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Number of concurrent download workers
    #[arg(long, default_value = "8", value_parser = parse_workers)]
    pub workers: usize,

    /// Retries per file after the first attempt
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Abort and retry reads that stall past a per-attempt deadline
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub stall_timeout: bool,
}

fn parse_gcs_url(s: &str) -> Result<GcsObject, String> {
    s.parse()
}

fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("worker count must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!(
            "worker count {value} exceeds maximum of {MAX_WORKERS}"
        ));
    }
    Ok(value)
}

impl Cli {
    /// Run the configured ingestion and return its aggregate statistics.
    ///
    /// Ctrl+C cancels the run: workers stop picking up jobs and in-flight
    /// downloads are cut short, leaving no partial files in the destination.
    pub async fn execute(&self) -> Result<JobStats, FetchError> {
        let staging_dir = self
            .staging_dir
            .clone()
            .unwrap_or_else(|| self.dest_dir.join(DEFAULT_STAGING_DIR));

        let config = FetcherConfig {
            bucket: self.source.bucket.clone(),
            object: self.source.object.clone(),
            generation: self.source.generation,
            dest_dir: self.dest_dir.clone(),
            staging_dir,
            worker_count: self.workers,
            retries: self.retries,
            stall_timeout: self.stall_timeout,
        };

        info!(
            source = %self.source,
            dest = %config.dest_dir.display(),
            workers = config.worker_count,
            retries = config.retries,
            "starting source fetch"
        );

        let fetcher = Arc::new(Fetcher::new(
            Arc::new(GcsClient::new()),
            Arc::new(RealFs),
            config,
        ));

        tokio::spawn({
            let fetcher = Arc::clone(&fetcher);
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl+C received - cancelling in-flight downloads...");
                    fetcher.cancel();
                }
            }
        });

        let started = Instant::now();
        let stats = match self.source_type {
            SourceType::Manifest => fetcher.fetch_from_manifest().await?,
            SourceType::Zip => fetcher.fetch_from_zip().await?,
            SourceType::TarGz => fetcher.fetch_from_tar_gz().await?,
        };

        info!(
            files = stats.files,
            bytes = stats.size,
            retries = stats.retries,
            failures = stats.errs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "source fetch finished"
        );
        Ok(stats)
    }
}
