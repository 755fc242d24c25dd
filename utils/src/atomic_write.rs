//! Crash-safe replacement of small record files.
//!
//! The new contents land in a sibling temp file that is synced and renamed
//! over the target. A reader sees the old record or the new one. If the
//! platform refuses to rename over an existing file, the old record is parked
//! at `<name>.bak` for the duration of the swap; [`recover_bak_file`] puts it
//! back when a crash left only the backup behind.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("bak")
}

/// Restore `path` from its `.bak` sibling if the record itself is missing.
pub fn recover_bak_file(path: &Path) {
    let backup = backup_path(path);
    if path.exists() || !backup.exists() {
        return;
    }
    match fs::rename(&backup, path) {
        Ok(()) => tracing::warn!(path = %path.display(), "Recovered record from .bak"),
        Err(e) => tracing::warn!(path = %path.display(), "Could not recover .bak: {e}"),
    }
}

/// Replace `path` with `bytes`. The parent directory must exist.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if let Err(first) = tmp.persist(path) {
        if !path.exists() {
            return Err(first.error);
        }
        let backup = backup_path(path);
        fs::rename(path, &backup)?;
        if let Err(second) = first.file.persist(path) {
            if let Err(e) = fs::rename(&backup, path) {
                tracing::error!(path = %path.display(), "Could not restore record from .bak: {e}");
            }
            return Err(second.error);
        }
        if let Err(e) = fs::remove_file(&backup) {
            tracing::debug!(path = %backup.display(), "Stale .bak left behind: {e}");
        }
    }

    sync_dir(dir);
    Ok(())
}

fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(path = %dir.display(), "Directory sync failed: {e}");
    }
    #[cfg(not(unix))]
    let _ = dir;
}
