use chrono::{DateTime, Datelike, Local, Timelike};
use log::{debug, info};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{BackupError, Result};

/// Non-directory entries of `dir`, sorted by name.
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| BackupError::io(dir, e))? {
        let entry = entry.map_err(|e| BackupError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| BackupError::io(entry.path(), e))?;
        if !file_type.is_dir() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Bundle `sources` into a Deflate-compressed zip at `target`.
///
/// Entries are named by the source's base name and carry its modification
/// time. A failure part way through leaves the partial archive on disk.
pub fn package(sources: &[PathBuf], target: &Path) -> Result<usize> {
    info!(
        "Packaging {} files into {}",
        sources.len(),
        target.display()
    );

    let file = File::create(target).map_err(|e| BackupError::io(target, e))?;
    let mut zip = ZipWriter::new(file);

    for source in sources {
        add_file(&mut zip, source, target)?;
    }

    zip.finish().map_err(|source| BackupError::Archive {
        path: target.to_path_buf(),
        source,
    })?;

    Ok(sources.len())
}

fn add_file(zip: &mut ZipWriter<File>, path: &Path, target: &Path) -> Result<()> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            BackupError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;

    let mut source = File::open(path).map_err(|e| BackupError::io(path, e))?;
    let metadata = source.metadata().map_err(|e| BackupError::io(path, e))?;

    let mut options =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    if let Some(modified) = metadata.modified().ok().and_then(zip_time) {
        options = options.last_modified_time(modified);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode());
    }

    zip.start_file(name.as_str(), options)
        .map_err(|source| BackupError::Archive {
            path: target.to_path_buf(),
            source,
        })?;
    let written = io::copy(&mut source, zip).map_err(|e| BackupError::io(path, e))?;
    debug!("Added {name} ({written} bytes) to {}", target.display());

    Ok(())
}

/// Zip timestamps are local, two-second resolution, and start in 1980.
fn zip_time(modified: std::time::SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = modified.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

/// Delete each of `sources` in order, stopping at the first failure.
pub fn purge_sources(sources: &[PathBuf]) -> Result<usize> {
    for (deleted, path) in sources.iter().enumerate() {
        if let Err(source) = fs::remove_file(path) {
            return Err(BackupError::Purge {
                path: path.clone(),
                remaining: sources.len() - deleted,
                source,
            });
        }
        debug!("Deleted {}", path.display());
    }
    Ok(sources.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn package_then_extract_preserves_names_and_bytes() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let first = src.path().join("000000010000000000000001");
        let second = src.path().join("000000010000000000000002");
        fs::write(&first, vec![7u8; 64 * 1024]).unwrap();
        fs::write(&second, b"segment two").unwrap();
        let target = out.path().join("wal_backup_20240101_000000.zip");

        let count = package(&[first.clone(), second.clone()], &target).unwrap();
        assert_eq!(count, 2);

        let mut archive = ZipArchive::new(File::open(&target).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        for path in [&first, &second] {
            let name = path.file_name().unwrap().to_str().unwrap();
            let mut entry = archive.by_name(name).unwrap();
            assert_eq!(entry.compression(), CompressionMethod::Deflated);
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            assert_eq!(contents, fs::read(path).unwrap());
        }
    }

    #[test]
    fn package_fails_on_missing_source_and_leaves_partial_file() {
        let src = tempdir().unwrap();
        let present = src.path().join("present");
        fs::write(&present, b"x").unwrap();
        let target = src.path().join("out.zip");

        let err = package(&[present, src.path().join("missing")], &target).unwrap_err();

        assert!(matches!(err, BackupError::Io { ref path, .. } if path.ends_with("missing")));
        assert!(target.exists());
    }

    #[test]
    fn collect_files_skips_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();
        fs::create_dir(dir.path().join("archive_status")).unwrap();

        let files = collect_files(dir.path()).unwrap();

        assert_eq!(files, vec![dir.path().join("a"), dir.path().join("b")]);
    }

    #[test]
    fn purge_stops_at_first_failure() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"").unwrap();
        fs::write(&b, b"").unwrap();

        let err = purge_sources(&[a.clone(), dir.path().join("gone"), b.clone()]).unwrap_err();

        match err {
            BackupError::Purge { path, remaining, .. } => {
                assert!(path.ends_with("gone"));
                assert_eq!(remaining, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!a.exists());
        assert!(b.exists());
    }

    #[test]
    fn purge_deletes_everything() {
        let dir = tempdir().unwrap();
        let files: Vec<PathBuf> = (0..3).map(|i| dir.path().join(i.to_string())).collect();
        for file in &files {
            fs::write(file, b"").unwrap();
        }

        assert_eq!(purge_sources(&files).unwrap(), 3);
        assert!(files.iter().all(|f| !f.exists()));
    }
}
