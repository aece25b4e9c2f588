//! Crash-safe copy primitives
//!
//! Every copy goes to a uniquely named temp file in the destination
//! directory, is fsynced, and is then renamed over the target. Readers of the
//! destination only ever see the previous complete file or the new one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Error type for mirror operations
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct MirrorError {
    pub message: String,
    pub kind: MirrorErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorErrorKind {
    CreateDir,
    Write,
    Sync,
    Rename,
    Path,
}

impl MirrorError {
    fn new(kind: MirrorErrorKind, message: String) -> Self {
        Self { message, kind }
    }
}

/// Stream `source` into `dest_dir/name`, replacing any previous file
///
/// Creates `dest_dir` if absent. On failure the previous destination (if
/// any) is left untouched and the temp file is removed.
pub fn copy<R: Read + ?Sized>(
    source: &mut R,
    dest_dir: &Path,
    name: &str,
) -> Result<PathBuf, MirrorError> {
    validate_name(name)?;

    if !dest_dir.is_dir() {
        fs::create_dir_all(dest_dir).map_err(|e| {
            MirrorError::new(
                MirrorErrorKind::CreateDir,
                format!("Failed to create directory {}: {}", dest_dir.display(), e),
            )
        })?;
    }

    let target = dest_dir.join(name);
    let temp_path = temp_path_for(dest_dir);

    let write_result = (|| -> Result<u64, MirrorError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| {
                MirrorError::new(
                    MirrorErrorKind::Write,
                    format!("Failed to create temp file {}: {}", temp_path.display(), e),
                )
            })?;

        let written = io::copy(source, &mut file).map_err(|e| {
            MirrorError::new(
                MirrorErrorKind::Write,
                format!("Failed to write {}: {}", temp_path.display(), e),
            )
        })?;

        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                MirrorError::new(
                    MirrorErrorKind::Sync,
                    format!("Failed to sync temp file: {}", e),
                )
            })?;

        Ok(written)
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, &target) {
        let _ = fs::remove_file(&temp_path);
        return Err(MirrorError::new(
            MirrorErrorKind::Rename,
            format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                target.display(),
                e
            ),
        ));
    }

    sync_directory(dest_dir)?;

    Ok(target)
}

/// Write data to a file atomically with fsync
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), MirrorError> {
    let parent = path.parent().ok_or_else(|| {
        MirrorError::new(
            MirrorErrorKind::Path,
            format!("Cannot determine parent directory for: {}", path.display()),
        )
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut reader = data;
    copy(&mut reader, parent, &name).map(|_| ())
}

/// Sync a directory so a completed rename survives a crash
pub fn sync_directory(path: &Path) -> Result<(), MirrorError> {
    #[cfg(unix)]
    {
        let dir = File::open(path).map_err(|e| {
            MirrorError::new(
                MirrorErrorKind::Sync,
                format!("Failed to open directory {}: {}", path.display(), e),
            )
        })?;

        dir.sync_all().map_err(|e| {
            MirrorError::new(
                MirrorErrorKind::Sync,
                format!("Failed to sync directory {}: {}", path.display(), e),
            )
        })?;
    }

    // NTFS renames are atomic; there is no directory handle to sync
    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// Temp files are hidden, never carry the target's extension, and have a
/// fixed-length name so any name that fits the directory fits its temp file
fn temp_path_for(dir: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".{:016x}.{:08x}.tmp", seq, std::process::id()))
}

fn validate_name(name: &str) -> Result<(), MirrorError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');

    if invalid {
        return Err(MirrorError::new(
            MirrorErrorKind::Path,
            format!("Invalid destination name: {:?}", name),
        ));
    }
    Ok(())
}
