//! Zip and tar.gz extraction.
//!
//! Both extractors share the same contract: expand every entry of a local
//! archive into a destination directory, preserving the mode bits the
//! archive records, and return the ordered list of created paths. The first
//! error aborts the extraction. Entries that would escape the destination
//! directory are rejected.

mod tar_gz;
mod zip;

pub use self::tar_gz::untar_gz;
pub use self::zip::unzip;

/// Extraction failures.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// A local read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive is not a readable zip.
    #[error("invalid zip archive: {0}")]
    Zip(#[from] ::zip::result::ZipError),

    /// The archive is not a readable tar.gz.
    #[error("invalid tar.gz archive: {0}")]
    TarGz(String),

    /// An entry path points outside the destination directory.
    #[error("archive entry {0} escapes the destination directory")]
    UnsafePath(String),
}
