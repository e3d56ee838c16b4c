//! Object-storage addressing and the streaming-read seam.
//!
//! The fetch engine talks to storage exclusively through [`ObjectStore`],
//! which opens a streaming read of `(bucket, object, generation)` and
//! surfaces errors as typed values. Permission denials carry the bucket and
//! the rejected principal so the operator-facing message can name both.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

pub mod gcs;

pub use gcs::GcsClient;

/// A streaming read of one object's bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// The storage backend rejected the read.
///
/// The rendered message is the operator-facing contract: it names the bucket
/// and the principal that must be granted access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Access to bucket {bucket} denied. You must grant Storage Object Viewer \
     permission to {principal}. If you are using VPC Service Controls, you \
     must also grant it access to your service perimeter."
)]
pub struct PermissionError {
    /// Bucket the read was issued against.
    pub bucket: String,
    /// Principal the backend reported as lacking access.
    pub principal: String,
}

/// Errors surfaced by an [`ObjectStore`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// Access denied by the backend. Fatal; never retried.
    #[error(transparent)]
    PermissionDenied(#[from] PermissionError),

    /// Any other reader or backend failure. Retriable.
    #[error("{0}")]
    Transport(String),
}

/// Streaming-read capability over an object-storage backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a streaming read of `(bucket, object)`.
    ///
    /// When `generation` is present it must be honored so retries observe
    /// the same bytes.
    async fn new_reader(
        &self,
        bucket: &str,
        object: &str,
        generation: Option<i64>,
    ) -> Result<ByteStream, StorageError>;
}

/// The logical name of one stored object: `gs://bucket/object[#generation]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GcsObject {
    /// Bucket name.
    pub bucket: String,
    /// Object name, possibly containing slashes.
    pub object: String,
    /// Immutable version stamp; re-reading the same generation returns the
    /// same bytes.
    pub generation: Option<i64>,
}

impl GcsObject {
    /// Build an address from its parts.
    pub fn new(
        bucket: impl Into<String>,
        object: impl Into<String>,
        generation: Option<i64>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
            generation,
        }
    }
}

impl fmt::Display for GcsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)?;
        if let Some(generation) = self.generation {
            write!(f, "#{generation}")?;
        }
        Ok(())
    }
}

impl FromStr for GcsObject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("gs://")
            .ok_or_else(|| format!("{s} does not start with gs://"))?;

        let (path, generation) = match rest.rsplit_once('#') {
            Some((path, generation)) => {
                let generation: i64 = generation
                    .parse()
                    .map_err(|_| format!("invalid generation in {s}"))?;
                (path, Some(generation))
            }
            None => (rest, None),
        };

        let (bucket, object) = path
            .split_once('/')
            .ok_or_else(|| format!("{s} is missing an object name"))?;
        if bucket.is_empty() || object.is_empty() {
            return Err(format!("{s} is missing a bucket or object name"));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
            generation,
        })
    }
}
