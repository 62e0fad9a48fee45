//! Tar archive creation
//!
//! - Entries are added in sorted order so the same tree yields the same archive
//! - Compressed archives are gzip at maximum ratio
//! - Archives are written to a temp path and renamed into place after fsync

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;
use tracing::{info, warn};

use super::artifact::ARCHIVE_EXTENSION;
use super::errors::{BackupError, BackupResult};

fn tar_err(context: impl AsRef<str>, err: std::io::Error) -> BackupError {
    BackupError::io_error(context, err)
}

/// Collect all entries from a directory recursively, sorted by archive path
fn collect_entries(dir: &Path) -> BackupResult<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    collect_entries_recursive(dir, "", &mut entries)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn collect_entries_recursive(
    current_dir: &Path,
    prefix: &str,
    entries: &mut Vec<(String, PathBuf)>,
) -> BackupResult<()> {
    let mut dir_entries: Vec<_> = fs::read_dir(current_dir)
        .map_err(|e| BackupError::io_error_at_path(current_dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BackupError::io_error_at_path(current_dir, e))?;

    dir_entries.sort_by_key(|e| e.file_name());

    for entry in dir_entries {
        let fs_path = entry.path();
        let file_name = entry.file_name();
        let archive_path = if prefix.is_empty() {
            file_name.to_string_lossy().to_string()
        } else {
            format!("{}/{}", prefix, file_name.to_string_lossy())
        };

        entries.push((archive_path.clone(), fs_path.clone()));

        if fs_path.is_dir() {
            collect_entries_recursive(&fs_path, &archive_path, entries)?;
        }
    }

    Ok(())
}

/// Append the contents of `source_dir` at the archive root
fn append_tree<W: Write>(builder: &mut Builder<W>, source_dir: &Path) -> BackupResult<()> {
    for (archive_path, fs_path) in collect_entries(source_dir)? {
        if fs_path.is_dir() {
            builder
                .append_dir(&archive_path, &fs_path)
                .map_err(|e| tar_err(format!("add directory {}", archive_path), e))?;
        } else {
            let mut file =
                File::open(&fs_path).map_err(|e| BackupError::io_error_at_path(&fs_path, e))?;
            builder
                .append_file(&archive_path, &mut file)
                .map_err(|e| tar_err(format!("add file {}", archive_path), e))?;
        }
    }
    Ok(())
}

fn temp_path_for(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    output.with_file_name(name)
}

/// Delete a partial archive if it exists
pub fn cleanup_partial_archive(archive_path: &Path) {
    if archive_path.exists() {
        let _ = fs::remove_file(archive_path);
    }
}

/// Create an uncompressed tar of `source_dir` at `output_path`
pub fn create_tar_archive(source_dir: &Path, output_path: &Path) -> BackupResult<()> {
    let temp = temp_path_for(output_path);

    let result = (|| {
        let file = File::create(&temp).map_err(|e| BackupError::io_error_at_path(&temp, e))?;
        let mut builder = Builder::new(BufWriter::new(file));
        append_tree(&mut builder, source_dir)?;

        let writer = builder
            .into_inner()
            .map_err(|e| tar_err("finish archive", e))?;
        let file = writer
            .into_inner()
            .map_err(|e| tar_err("flush archive", e.into_error()))?;
        file.sync_all()
            .map_err(|e| tar_err(format!("fsync {}", temp.display()), e))?;

        fs::rename(&temp, output_path).map_err(|e| BackupError::io_error_at_path(output_path, e))
    })();

    if result.is_err() {
        cleanup_partial_archive(&temp);
    }
    result
}

fn write_compressed(source_dir: &Path, temp: &Path) -> BackupResult<()> {
    let file = File::create(temp).map_err(|e| BackupError::io_error_at_path(temp, e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::best());
    let mut builder = Builder::new(encoder);
    append_tree(&mut builder, source_dir)?;

    let encoder = builder
        .into_inner()
        .map_err(|e| tar_err("finish archive", e))?;
    let writer = encoder.finish().map_err(|e| tar_err("finish gzip stream", e))?;
    let file = writer
        .into_inner()
        .map_err(|e| tar_err("flush archive", e.into_error()))?;
    file.sync_all()
        .map_err(|e| tar_err(format!("fsync {}", temp.display()), e))
}

/// Compression stage: fold a snapshot directory into `<dir>.tar.gz`.
///
/// On success the directory is removed and the archive path returned. On
/// failure the partial archive is removed, the directory is left untouched,
/// and a [`BackupError::Compression`] is returned.
pub fn compress_snapshot(snapshot_dir: &Path) -> BackupResult<PathBuf> {
    let name = snapshot_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BackupError::Compression("snapshot path has no name".to_string()))?;
    let output = snapshot_dir.with_file_name(format!("{}{}", name, ARCHIVE_EXTENSION));
    let temp = temp_path_for(&output);

    let written = write_compressed(snapshot_dir, &temp).and_then(|_| {
        fs::rename(&temp, &output).map_err(|e| BackupError::io_error_at_path(&output, e))
    });

    if let Err(e) = written {
        cleanup_partial_archive(&temp);
        return Err(BackupError::Compression(e.to_string()));
    }

    if let Err(e) = fs::remove_dir_all(snapshot_dir) {
        warn!(
            snapshot = %snapshot_dir.display(),
            error = %e,
            "archive written but snapshot directory could not be removed"
        );
    }

    let size = fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
    info!(archive = %output.display(), bytes = size, "snapshot compressed");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tar::Archive;
    use tempfile::TempDir;

    fn create_snapshot_dir(root: &Path) -> PathBuf {
        let dir = root.join("db_20240301T020000000Z");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("inventory.db"), b"database bytes").unwrap();
        fs::write(dir.join("metadata.json"), br#"{"version":"1.0.0"}"#).unwrap();
        fs::write(dir.join("nested").join("extra.bin"), b"x").unwrap();
        dir
    }

    fn entry_names<R: Read>(archive: &mut Archive<R>) -> Vec<String> {
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_compress_replaces_directory() {
        let temp = TempDir::new().unwrap();
        let dir = create_snapshot_dir(temp.path());

        let archive_path = compress_snapshot(&dir).unwrap();

        assert_eq!(
            archive_path.file_name().unwrap(),
            "db_20240301T020000000Z.tar.gz"
        );
        assert!(!dir.exists());
        assert!(!temp_path_for(&archive_path).exists());

        let mut archive = Archive::new(GzDecoder::new(File::open(&archive_path).unwrap()));
        let names = entry_names(&mut archive);
        assert!(names.contains(&"inventory.db".to_string()));
        assert!(names.contains(&"metadata.json".to_string()));
        assert!(names.contains(&"nested/extra.bin".to_string()));
    }

    #[test]
    fn test_compress_failure_keeps_directory() {
        let temp = TempDir::new().unwrap();
        let dir = create_snapshot_dir(temp.path());
        // Occupy the temp archive path with a directory so the write fails
        fs::create_dir(temp.path().join("db_20240301T020000000Z.tar.gz.tmp")).unwrap();

        let result = compress_snapshot(&dir);

        assert!(matches!(result, Err(BackupError::Compression(_))));
        assert!(dir.join("inventory.db").exists());
        assert!(!temp.path().join("db_20240301T020000000Z.tar.gz").exists());
    }

    #[test]
    fn test_uncompressed_archive_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let dir = create_snapshot_dir(temp.path());

        let first = temp.path().join("a.tar");
        let second = temp.path().join("b.tar");
        create_tar_archive(&dir, &first).unwrap();
        create_tar_archive(&dir, &second).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_cleanup_nonexistent_archive() {
        let temp = TempDir::new().unwrap();
        cleanup_partial_archive(&temp.path().join("nonexistent.tar"));
    }
}
