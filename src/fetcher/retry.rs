//! The retrying fetcher.
//!
//! Wraps the single-attempt fetch with a bounded retry loop and the staged
//! write discipline: every attempt copies into a fresh staging path, and only
//! a fully-written, chmod-ed staging file is renamed into the destination.
//! The final path never holds a partial file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::fetcher::{timeout, AttemptRecord, FetchError, Fetcher, Job, JobReport, FINAL_FILE_MODE};

impl Fetcher {
    /// Fetch one job to its default destination path.
    ///
    /// Never fails externally: a failure manifests as `report.success =
    /// false` with the terminal error in `report.err`.
    pub async fn fetch_object(&self, job: Job) -> JobReport {
        let final_path = self.config().dest_dir.join(job.local_name());
        self.fetch_object_to(job, final_path).await
    }

    /// Fetch one job to an explicit final path. Used by the dispatchers to
    /// land prefetched manifests and archives inside the staging directory.
    pub async fn fetch_object_to(&self, job: Job, final_path: PathBuf) -> JobReport {
        let started = Instant::now();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_err: Option<FetchError> = None;

        for attempt in 0..=self.config().retries {
            let attempt_started = Instant::now();
            let outcome = self.run_attempt(&job, &final_path, attempt).await;
            let duration = attempt_started.elapsed();

            match outcome {
                Ok(size) => {
                    attempts.push(AttemptRecord {
                        started: attempt_started,
                        duration,
                        err: None,
                    });
                    debug!(
                        object = %job.address(),
                        file = job.local_name(),
                        bytes = size,
                        attempts = attempts.len(),
                        "object materialized"
                    );
                    return JobReport {
                        job,
                        success: true,
                        err: None,
                        started,
                        completed: Instant::now(),
                        size,
                        final_path: Some(final_path),
                        attempts,
                    };
                }
                Err(err) => {
                    warn!(
                        object = %job.address(),
                        attempt = attempt + 1,
                        budget = self.config().retries + 1,
                        error = %err,
                        "fetch attempt failed"
                    );
                    attempts.push(AttemptRecord {
                        started: attempt_started,
                        duration,
                        err: Some(err.clone()),
                    });
                    let fatal = err.is_fatal();
                    last_err = Some(err);
                    if fatal {
                        break;
                    }
                }
            }
            // A cancelled run gets no further attempts.
            if self.cancelled() {
                break;
            }
        }

        JobReport {
            job,
            success: false,
            err: last_err,
            started,
            completed: Instant::now(),
            size: 0,
            final_path: None,
            attempts,
        }
    }

    /// One traversal of mkdir → copy → chmod → rename. Any failure after the
    /// copy converts the whole attempt to a failure, and the staging remnant
    /// is removed so the next attempt starts clean.
    async fn run_attempt(
        &self,
        job: &Job,
        final_path: &Path,
        attempt: u32,
    ) -> Result<u64, FetchError> {
        if let Some(parent) = final_path.parent() {
            self.ensure_dir(parent).await?;
        }
        self.ensure_dir(&self.config().staging_dir).await?;

        let staging = self.staging_path(final_path);
        let copied = if self.config().stall_timeout {
            let deadline = timeout::for_attempt(job.local_name(), attempt);
            self.fetch_once_with_deadline(job, deadline, &staging).await
        } else {
            let (breaker_tx, mut breaker) = mpsc::channel(1);
            drop(breaker_tx);
            self.fetch_once(job, &staging, &mut breaker).await
        };

        let size = match copied {
            Ok(size) => size,
            Err(err) => {
                self.discard_staging(&staging).await;
                return Err(err);
            }
        };

        if let Err(e) = self.fs().chmod(&staging, FINAL_FILE_MODE).await {
            self.discard_staging(&staging).await;
            return Err(FetchError::Filesystem(format!(
                "setting mode on {}: {e}",
                staging.display()
            )));
        }
        if let Err(e) = self.fs().rename(&staging, final_path).await {
            self.discard_staging(&staging).await;
            return Err(FetchError::Filesystem(format!(
                "renaming {} to {}: {e}",
                staging.display(),
                final_path.display()
            )));
        }

        Ok(size)
    }

    async fn discard_staging(&self, staging: &Path) {
        if let Err(e) = self.fs().remove_all(staging).await {
            warn!(staging = %staging.display(), error = %e, "removing staging remnant failed");
        }
    }
}
