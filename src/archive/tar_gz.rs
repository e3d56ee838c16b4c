//! Tar.gz expansion.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::archive::ArchiveError;

/// Expand `archive` into `dest`, returning the created paths in entry order.
///
/// Modes recorded in the tar headers are preserved. Aborts on the first
/// error; entries that would unpack outside `dest` are rejected.
pub fn untar_gz(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::open(archive)?;
    let decoder = GzDecoder::new(BufReader::with_capacity(64 * 1024, file));
    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);

    let mut created = Vec::new();
    for entry in tar
        .entries()
        .map_err(|e| ArchiveError::TarGz(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| ArchiveError::TarGz(e.to_string()))?;
        let raw_name = entry
            .path()
            .map_err(|e| ArchiveError::TarGz(e.to_string()))?
            .into_owned();

        if !entry.unpack_in(dest)? {
            return Err(ArchiveError::UnsafePath(raw_name.display().to_string()));
        }
        created.push(dest.join(raw_name));
    }

    Ok(created)
}
