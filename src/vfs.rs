//! Filesystem indirection for the fetch engine.
//!
//! Every file operation the engine performs goes through the [`FileSystem`]
//! trait so tests can inject failures at specific call sites (a create that
//! fails once, a rename that always fails) while passing everything else
//! through to the real filesystem.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;

/// File operations used by the fetch engine.
///
/// The trait mirrors the handful of primitives the engine needs: staging-file
/// creation, atomic promotion via rename, permission stamping, parent
/// directory creation, manifest reads, and staging cleanup. Successful calls
/// behave exactly like their `tokio::fs` counterparts.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Create (truncating) a file for writing.
    async fn create(&self, path: &Path) -> io::Result<File>;

    /// Open an existing file for reading.
    async fn open(&self, path: &Path) -> io::Result<File>;

    /// Atomically rename `from` to `to`.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Set the permission bits on a file.
    async fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Create a directory and all missing parents.
    async fn mkdir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or directory tree. Missing paths are not an error.
    async fn remove_all(&self, path: &Path) -> io::Result<()>;
}

/// The real filesystem, backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

#[async_trait]
impl FileSystem for RealFs {
    async fn create(&self, path: &Path) -> io::Result<File> {
        File::create(path).await
    }

    async fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    #[cfg(unix)]
    async fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
    }

    #[cfg(not(unix))]
    async fn chmod(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }

    async fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
