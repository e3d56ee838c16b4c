//! The concurrent fetch engine.
//!
//! A [`Fetcher`] is built once per run from a [`FetcherConfig`] plus the
//! storage and filesystem seams, then drives one of three ingestion
//! dispatchers: [`Fetcher::fetch_from_manifest`], [`Fetcher::fetch_from_zip`],
//! or [`Fetcher::fetch_from_tar_gz`]. Underneath, every file goes through the
//! same path: a worker pool feeds the retrying fetcher, which runs bounded
//! single attempts under a stall watchdog and atomically promotes each
//! fully-written staging file into the destination directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::storage::{ObjectStore, PermissionError, StorageError};
use crate::vfs::FileSystem;

mod archives;
mod attempt;
mod job;
mod manifest;
mod pool;
mod retry;

/// Per-attempt timeout policy
pub mod timeout;

pub use job::{AttemptRecord, Job, JobReport, JobStats};
pub use manifest::ManifestEntry;
pub use pool::SharedJobQueue;

/// Mode bits stamped on every materialized file before promotion.
const FINAL_FILE_MODE: u32 = 0o644;

/// Errors produced while fetching one object or dispatching a run.
///
/// The fatal-vs-retriable split is decided here, at the lowest layer, and
/// bubbles up unchanged through the retry loop and the worker pool.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Access denied by the storage backend. Fatal; aborts the whole run.
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// The stall watchdog fired before the attempt completed. Retriable.
    #[error("timed out fetching object")]
    Timeout,

    /// Any other reader or backend failure. Retriable.
    #[error("transport error: {0}")]
    Transport(String),

    /// A local create/write/chmod/rename/mkdir failure. Retriable.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// The manifest was not valid JSON. Fatal; never retried.
    #[error("decoding JSON from manifest file {path}: {reason}")]
    ManifestDecode {
        /// Local path of the fetched manifest.
        path: String,
        /// Decoder failure detail.
        reason: String,
    },

    /// The manifest decoded but an entry was unusable. Fatal.
    #[error("invalid manifest: {0}")]
    Manifest(String),
}

impl FetchError {
    /// Whether this error aborts the run instead of consuming retry budget.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::Permission(_) | FetchError::ManifestDecode { .. } | FetchError::Manifest(_)
        )
    }
}

impl From<StorageError> for FetchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PermissionDenied(inner) => FetchError::Permission(inner),
            StorageError::Transport(msg) => FetchError::Transport(msg),
        }
    }
}

/// Process-wide configuration for one ingestion run. Immutable once built.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Bucket holding the manifest or archive object.
    pub bucket: String,
    /// Name of the manifest or archive object.
    pub object: String,
    /// Generation pin for the manifest or archive object, if any.
    pub generation: Option<i64>,
    /// Directory the source tree is materialized into.
    pub dest_dir: PathBuf,
    /// Private directory staging files are written to before promotion.
    pub staging_dir: PathBuf,
    /// Number of concurrent download workers.
    pub worker_count: usize,
    /// Retry budget per file; a file is attempted at most `retries + 1` times.
    pub retries: u32,
    /// Arm the per-attempt stall watchdog. When false, attempts run without
    /// a deadline and only outer cancellation can cut a stalled read short.
    pub stall_timeout: bool,
}

/// One-way cancellation latch for a run.
///
/// Tripped by the binary's Ctrl+C handler or by the pool the moment a fatal
/// report surfaces. Workers gate job dequeue on it, in-flight copy loops
/// select on it, and the retry loop stops scheduling attempts once it is
/// set.
#[derive(Debug, Default)]
struct CancelFlag {
    tripped: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    fn trip(&self) {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if self.is_tripped() {
            return;
        }
        self.notify.notified().await;
    }
}

/// The fetch engine. Cheap to share behind an [`Arc`]; all methods take
/// `&self`.
pub struct Fetcher {
    store: Arc<dyn ObjectStore>,
    fs: Arc<dyn FileSystem>,
    config: FetcherConfig,
    created_dirs: Mutex<HashSet<PathBuf>>,
    staging_seq: AtomicU64,
    cancel_flag: CancelFlag,
}

impl Fetcher {
    /// Create a fetcher from its seams and configuration.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        fs: Arc<dyn FileSystem>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            store,
            fs,
            config,
            created_dirs: Mutex::new(HashSet::new()),
            staging_seq: AtomicU64::new(0),
            cancel_flag: CancelFlag::default(),
        }
    }

    /// The run configuration.
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Cancel the run: workers stop picking up jobs, in-flight copies are
    /// cut short, and no further retry attempts are scheduled. Called by the
    /// binary's Ctrl+C handler; the pool also trips it when a fatal report
    /// arrives.
    pub fn cancel(&self) {
        self.cancel_flag.trip();
    }

    pub(crate) fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel_flag.is_tripped()
    }

    /// Resolves once the run has been cancelled.
    pub(crate) async fn wait_cancelled(&self) {
        self.cancel_flag.wait().await
    }

    /// Ensure `dir` exists, consulting the created-directory set so workers
    /// skip redundant mkdirs. The entry is inserted only after a successful
    /// creation; a failed mkdir leaves the set untouched.
    pub(crate) async fn ensure_dir(&self, dir: &Path) -> Result<(), FetchError> {
        if self.created_dirs_lock().contains(dir) {
            return Ok(());
        }
        self.fs.mkdir_all(dir).await.map_err(|e| {
            FetchError::Filesystem(format!("creating directory {}: {e}", dir.display()))
        })?;
        self.created_dirs_lock().insert(dir.to_path_buf());
        Ok(())
    }

    /// Unique staging path for one job attempt: the final file's basename
    /// plus a per-job discriminator, inside the private staging directory.
    pub(crate) fn staging_path(&self, final_path: &Path) -> PathBuf {
        let base = final_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "object".to_string());
        let seq = self.staging_seq.fetch_add(1, Ordering::Relaxed);
        self.config.staging_dir.join(format!("{base}-{seq}"))
    }

    pub(crate) fn created_dirs_lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.created_dirs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
