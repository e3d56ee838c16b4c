//! Job, per-attempt telemetry, and aggregate run statistics.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::fetcher::FetchError;
use crate::storage::GcsObject;

/// An immutable request to materialize one object. Created by a dispatcher;
/// consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Source bucket.
    pub bucket: String,
    /// Source object name.
    pub object: String,
    /// Generation pin, when the source URL carried one.
    pub generation: Option<i64>,
    /// Target filename relative to the destination directory. Defaults to
    /// the object name.
    pub filename: Option<String>,
}

impl Job {
    /// Build a job for `bucket/object` landing at its default filename.
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
            generation: None,
            filename: None,
        }
    }

    /// Set the target relative filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// The destination-relative filename this job materializes.
    pub fn local_name(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.object)
    }

    /// The storage address, for logging.
    pub fn address(&self) -> GcsObject {
        GcsObject::new(self.bucket.clone(), self.object.clone(), self.generation)
    }
}

/// Telemetry for one try: start instant, elapsed time, outcome. Appended in
/// attempt order and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// When the attempt started.
    pub started: Instant,
    /// How long the attempt ran.
    pub duration: Duration,
    /// `None` on success; at most the final record may be successful.
    pub err: Option<FetchError>,
}

/// The outcome of one job after retries conclude. Exactly one per job.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// The originating job.
    pub job: Job,
    /// Whether the file was materialized.
    pub success: bool,
    /// The terminal error when unsuccessful.
    pub err: Option<FetchError>,
    /// When the first attempt started.
    pub started: Instant,
    /// When the job concluded.
    pub completed: Instant,
    /// Bytes delivered to the destination; zero when unsuccessful.
    pub size: u64,
    /// Absolute path of the materialized file; `None` when unsuccessful.
    pub final_path: Option<PathBuf>,
    /// Per-attempt telemetry, in attempt order.
    pub attempts: Vec<AttemptRecord>,
}

impl JobReport {
    /// The report's error when it is fatal for the whole run.
    pub fn fatal_error(&self) -> Option<&FetchError> {
        self.err.as_ref().filter(|err| err.is_fatal())
    }
}

/// Statistics aggregated across one ingestion run.
#[derive(Debug, Clone)]
pub struct JobStats {
    /// Files attempted.
    pub files: usize,
    /// Bytes delivered by successful jobs.
    pub size: u64,
    /// Attempts beyond the first, summed over all jobs.
    pub retries: usize,
    /// Whether every job succeeded.
    pub success: bool,
    /// Terminal per-file errors, in completion order.
    pub errs: Vec<FetchError>,
}

impl JobStats {
    /// Fresh statistics for a run with no completed jobs yet.
    pub fn new() -> Self {
        Self {
            files: 0,
            size: 0,
            retries: 0,
            success: true,
            errs: Vec::new(),
        }
    }

    /// Fold one job report into the totals.
    pub fn absorb(&mut self, report: &JobReport) {
        self.files += 1;
        self.retries += report.attempts.len().saturating_sub(1);
        self.size += report.size;
        if !report.success {
            self.success = false;
            if let Some(err) = &report.err {
                self.errs.push(err.clone());
            }
        }
    }
}

impl Default for JobStats {
    fn default() -> Self {
        Self::new()
    }
}
