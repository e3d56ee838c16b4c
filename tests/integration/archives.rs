//! Archive extraction round-trips and the archive dispatchers.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::common::*;
use gcs_source_fetcher::archive::{untar_gz, unzip};
use gcs_source_fetcher::fetcher::FetchError;

struct ArchiveEntry {
    name: &'static str,
    content: &'static str,
    mode: u32,
}

fn entry(name: &'static str, content: &'static str, mode: u32) -> ArchiveEntry {
    ArchiveEntry {
        name,
        content,
        mode,
    }
}

fn round_trip_cases() -> Vec<(&'static str, Vec<ArchiveEntry>)> {
    vec![
        ("empty archive", vec![]),
        (
            "single file",
            vec![entry("file.txt", "file.txt content", 0o644)],
        ),
        (
            "multiple files",
            vec![
                entry("file.txt", "file.txt content", 0o644),
                entry("another/", "", 0o755),
                entry("another/file.txt", "another file-2.txt content", 0o644),
            ],
        ),
        ("single directory", vec![entry("directory/", "", 0o755)]),
        (
            "multiple directories",
            vec![entry("some/", "", 0o755), entry("some/directory/", "", 0o755)],
        ),
        (
            "complex",
            vec![
                entry("file.txt", "file.txt content", 0o644),
                entry("some/", "", 0o755),
                entry("some/directory/", "", 0o755),
                entry("some/directory/file.txt", "another file-2.txt content", 0o644),
                entry("some/other-directory/", "", 0o755),
            ],
        ),
    ]
}

/// Expected `(name, mode, content)` tuples for a case, directories marked by
/// a trailing slash.
fn expected_tuples(entries: &[ArchiveEntry]) -> Vec<(String, u32, String)> {
    let mut want: Vec<(String, u32, String)> = entries
        .iter()
        .map(|e| (e.name.to_string(), e.mode, e.content.to_string()))
        .collect();
    want.sort();
    want
}

/// Walk `root` and collect `(relative name, mode bits, content)` tuples.
fn walk_tree(root: &Path) -> Vec<(String, u32, String)> {
    fn visit(root: &Path, dir: &Path, out: &mut Vec<(String, u32, String)>) {
        for dir_entry in std::fs::read_dir(dir).unwrap() {
            let dir_entry = dir_entry.unwrap();
            let path = dir_entry.path();
            let meta = dir_entry.metadata().unwrap();
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let mode = meta.permissions().mode() & 0o777;
            if meta.is_dir() {
                out.push((format!("{rel}/"), mode, String::new()));
                visit(root, &path, out);
            } else {
                out.push((rel, mode, std::fs::read_to_string(&path).unwrap()));
            }
        }
    }

    let mut out = Vec::new();
    visit(root, root, &mut out);
    out.sort();
    out
}

fn build_zip(entries: &[ArchiveEntry]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for e in entries {
        let options = SimpleFileOptions::default().unix_permissions(e.mode);
        if e.name.ends_with('/') {
            writer.add_directory(e.name, options).unwrap();
        } else {
            writer.start_file(e.name, options).unwrap();
            writer.write_all(e.content.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

fn build_tar_gz(entries: &[ArchiveEntry]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for e in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mode(e.mode);
        if e.name.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            builder
                .append_data(&mut header, e.name, std::io::empty())
                .unwrap();
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(e.content.len() as u64);
            builder
                .append_data(&mut header, e.name, e.content.as_bytes())
                .unwrap();
        }
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[test]
fn test_unzip_round_trip() {
    for (name, entries) in round_trip_cases() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("source.zip");
        std::fs::write(&zip_path, build_zip(&entries)).unwrap();

        let dest = tmp.path().join("unzip");
        std::fs::create_dir_all(&dest).unwrap();

        let created = unzip(&zip_path, &dest).unwrap();
        assert_eq!(created.len(), entries.len(), "case {name}: created paths");
        assert_eq!(
            walk_tree(&dest),
            expected_tuples(&entries),
            "case {name}: extracted tree"
        );
    }
}

#[test]
fn test_untar_gz_round_trip() {
    for (name, entries) in round_trip_cases() {
        let tmp = tempfile::tempdir().unwrap();
        let tar_path = tmp.path().join("source.tar.gz");
        std::fs::write(&tar_path, build_tar_gz(&entries)).unwrap();

        let dest = tmp.path().join("untar");
        std::fs::create_dir_all(&dest).unwrap();

        let created = untar_gz(&tar_path, &dest).unwrap();
        assert_eq!(created.len(), entries.len(), "case {name}: created paths");
        assert_eq!(
            walk_tree(&dest),
            expected_tuples(&entries),
            "case {name}: extracted tree"
        );
    }
}

#[test]
fn test_unzip_rejects_garbage() {
    let tmp = tempfile::tempdir().unwrap();
    let zip_path = tmp.path().join("garbage.zip");
    std::fs::write(&zip_path, b"this is not a zip file").unwrap();
    assert!(unzip(&zip_path, tmp.path()).is_err());
}

#[tokio::test]
async fn test_fetch_from_zip_expands_into_destination() {
    let payload = build_zip(&[
        entry("hello.txt", "hello from the archive", 0o644),
        entry("nested/", "", 0o755),
        entry("nested/world.txt", "nested content", 0o644),
    ]);
    let tc = build_custom(move |store, config| {
        store.insert(SUCCESS_BUCKET, "source.zip", FakeResponse::Bytes(payload));
        config.object = "source.zip".to_string();
    });

    let stats = Arc::clone(&tc.fetcher)
        .fetch_from_zip()
        .await
        .expect("fetch_from_zip");

    assert!(stats.success);
    assert_eq!(stats.files, 3);
    assert_eq!(
        std::fs::read_to_string(tc.work_dir.path().join("hello.txt")).unwrap(),
        "hello from the archive"
    );
    assert_eq!(
        std::fs::read_to_string(tc.work_dir.path().join("nested/world.txt")).unwrap(),
        "nested content"
    );
    // The staging copy of the archive is cleaned up.
    assert!(!tc.work_dir.path().join(".staging").exists());
}

#[tokio::test]
async fn test_fetch_from_tar_gz_expands_into_destination() {
    let payload = build_tar_gz(&[
        entry("dir/", "", 0o755),
        entry("dir/file.go", "package main", 0o644),
    ]);
    let tc = build_custom(move |store, config| {
        store.insert(
            SUCCESS_BUCKET,
            "source.tar.gz",
            FakeResponse::Bytes(payload),
        );
        config.object = "source.tar.gz".to_string();
    });

    let stats = Arc::clone(&tc.fetcher)
        .fetch_from_tar_gz()
        .await
        .expect("fetch_from_tar_gz");

    assert!(stats.success);
    assert_eq!(stats.files, 2);
    assert_eq!(
        std::fs::read_to_string(tc.work_dir.path().join("dir/file.go")).unwrap(),
        "package main"
    );
}

#[tokio::test]
async fn test_fetch_from_zip_permission_denied() {
    let tc = build_custom(|_, config| {
        config.bucket = ERROR_BUCKET.to_string();
        config.object = EFILE_DENIED.to_string();
    });

    let err = Arc::clone(&tc.fetcher)
        .fetch_from_zip()
        .await
        .expect_err("zip fetch should be denied");
    assert!(matches!(err, FetchError::Permission(_)), "got {err:?}");
}

#[tokio::test]
async fn test_fetch_from_tar_gz_permission_denied() {
    let tc = build_custom(|_, config| {
        config.bucket = ERROR_BUCKET.to_string();
        config.object = EFILE_DENIED.to_string();
    });

    let err = Arc::clone(&tc.fetcher)
        .fetch_from_tar_gz()
        .await
        .expect_err("tar.gz fetch should be denied");
    assert!(matches!(err, FetchError::Permission(_)), "got {err:?}");
}
