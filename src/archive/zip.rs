//! Zip expansion.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::archive::ArchiveError;

/// Expand `archive` into `dest`, returning the created paths in entry order.
///
/// Directory entries (name ending in `/`) are created with the stored mode;
/// file entries get their parent directories created, then their contents
/// written with the stored mode. Aborts on the first error.
pub fn unzip(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;

    let mut created = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let raw_name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafePath(raw_name.clone()))?;
        let target = dest.join(relative);

        if raw_name.ends_with('/') {
            std::fs::create_dir_all(&target)?;
            if let Some(mode) = entry.unix_mode() {
                set_mode(&target, mode)?;
            }
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            if let Some(mode) = entry.unix_mode() {
                set_mode(&target, mode)?;
            }
        }

        created.push(target);
    }

    Ok(created)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
