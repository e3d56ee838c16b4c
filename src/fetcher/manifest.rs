//! Manifest-driven ingestion.
//!
//! The manifest is itself an object in the bucket: a JSON mapping from
//! destination-relative filenames to the `gs://` URLs of their contents. The
//! dispatcher prefetches it into the staging directory with the retrying
//! fetcher, decodes it, builds one job per entry, and runs the worker pool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::fetcher::{FetchError, Fetcher, Job, JobReport, JobStats};
use crate::storage::GcsObject;

/// One manifest entry. Unknown fields are tolerated.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    /// `gs://bucket/object[#generation]` URL of the file's contents.
    #[serde(rename = "SourceURL")]
    pub source_url: String,

    /// Content checksum. Accepted for forward compatibility; not verified.
    #[serde(rename = "Sha1Sum", default)]
    pub sha1_sum: String,
}

impl Fetcher {
    /// Fetch the manifest, then every file it names, into the destination
    /// directory.
    pub async fn fetch_from_manifest(self: Arc<Self>) -> Result<JobStats, FetchError> {
        let (manifest_path, _report) = self.prefetch_source().await?;

        let mut file = self.fs().open(&manifest_path).await.map_err(|e| {
            FetchError::Filesystem(format!(
                "opening manifest file {}: {e}",
                manifest_path.display()
            ))
        })?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw).await.map_err(|e| {
            FetchError::Filesystem(format!(
                "reading manifest file {}: {e}",
                manifest_path.display()
            ))
        })?;

        let entries: HashMap<String, ManifestEntry> =
            serde_json::from_slice(&raw).map_err(|e| FetchError::ManifestDecode {
                path: manifest_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut jobs = Vec::with_capacity(entries.len());
        for (filename, entry) in entries {
            let address: GcsObject = entry.source_url.parse().map_err(|reason| {
                FetchError::Manifest(format!(
                    "entry {filename}: invalid SourceURL {}: {reason}",
                    entry.source_url
                ))
            })?;
            jobs.push(Job {
                bucket: address.bucket,
                object: address.object,
                generation: address.generation,
                filename: Some(filename),
            });
        }
        info!(files = jobs.len(), "manifest decoded");

        let stats = Arc::clone(&self).process_jobs(jobs).await;
        self.cleanup_staging().await;
        stats
    }

    /// Fetch the run's configured source object (manifest or archive) into
    /// the staging directory, returning its local path and the fetch report.
    ///
    /// A failed prefetch surfaces as the report's terminal error, so a
    /// permission denial reaches the binary unchanged and exits the run with
    /// the distinguished status.
    pub(crate) async fn prefetch_source(&self) -> Result<(PathBuf, JobReport), FetchError> {
        self.ensure_dir(&self.config().staging_dir).await?;

        let job = Job {
            bucket: self.config().bucket.clone(),
            object: self.config().object.clone(),
            generation: self.config().generation,
            filename: None,
        };
        let base = self
            .config()
            .object
            .rsplit('/')
            .next()
            .unwrap_or("source")
            .to_string();
        let target = self.config().staging_dir.join(format!("source-{base}"));

        let report = self.fetch_object_to(job, target.clone()).await;
        if report.success {
            Ok((target, report))
        } else {
            Err(report
                .err
                .unwrap_or_else(|| FetchError::Transport("fetch failed".to_string())))
        }
    }

    /// Remove the private staging directory. Best effort; the destination
    /// tree is already complete by the time this runs.
    pub(crate) async fn cleanup_staging(&self) {
        let staging_dir = &self.config().staging_dir;
        if let Err(e) = self.fs().remove_all(staging_dir).await {
            warn!(staging = %staging_dir.display(), error = %e, "removing staging directory failed");
        }
        self.created_dirs_lock().remove(staging_dir);
    }
}
