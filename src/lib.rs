//! # GCS Source Fetcher Library
//!
//! Downloads a build's source tree from a Google Cloud Storage bucket into a
//! local working directory, as the first stage of a CI build. Three ingestion
//! shapes are supported:
//!
//! - **Manifest**: a JSON mapping from local filenames to `gs://` URLs, fanned
//!   out over a pool of concurrent download workers.
//! - **Zip archive**: fetched once, then expanded locally.
//! - **Tar.gz archive**: fetched once, then expanded locally.
//!
//! ## Features
//!
//! - **Bounded parallelism**: a fixed-size worker pool drains a job queue.
//! - **Per-attempt deadlines**: likely-small source files get tight stall
//!   deadlines so retries happen quickly; asset files get more slack.
//! - **Atomic materialization**: every file is written to a private staging
//!   directory and renamed into place only after a complete, correctly
//!   permissioned write. A failed download never leaves a partial file.
//! - **Typed error taxonomy**: permission denials are fatal and abort the run
//!   with a distinguished exit status; transport, timeout, and filesystem
//!   errors are retried against a bounded budget.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gcs_source_fetcher::fetcher::{Fetcher, FetcherConfig};
//! use gcs_source_fetcher::storage::GcsClient;
//! use gcs_source_fetcher::vfs::RealFs;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetcherConfig {
//!     bucket: "my-bucket".to_string(),
//!     object: "manifest.json".to_string(),
//!     generation: None,
//!     dest_dir: "/workspace".into(),
//!     staging_dir: "/workspace/.staging".into(),
//!     worker_count: 8,
//!     retries: 3,
//!     stall_timeout: true,
//! };
//! let fetcher = Arc::new(Fetcher::new(
//!     Arc::new(GcsClient::new()),
//!     Arc::new(RealFs),
//!     config,
//! ));
//! let stats = fetcher.fetch_from_manifest().await?;
//! println!("fetched {} files ({} bytes)", stats.files, stats.size);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`storage`] - Object-storage addressing, the streaming-read trait, and
//!   the GCS client implementation
//! - [`vfs`] - Filesystem indirection so tests can inject failures
//! - [`fetcher`] - The concurrent fetch engine: retrying fetcher, worker
//!   pool, timeout policy, run cancellation, and the three ingestion
//!   dispatchers
//! - [`archive`] - Zip and tar.gz extraction
//! - [`cli`] - Command-line surface and exit-code mapping

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Zip and tar.gz extraction
pub mod archive;

/// CLI command implementation
pub mod cli;

/// Concurrent fetch engine
pub mod fetcher;

/// Object-storage addressing and streaming reads
pub mod storage;

/// Filesystem indirection
pub mod vfs;

// Re-export commonly used types
pub use cli::PERMISSION_DENIED_EXIT_STATUS;
pub use fetcher::{FetchError, Fetcher, FetcherConfig, Job, JobReport, JobStats};
pub use storage::{GcsObject, ObjectStore, PermissionError, StorageError};
pub use vfs::{FileSystem, RealFs};
