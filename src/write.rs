//! Write Engine — atomic commit of replacement bytes.
//!
//! The replacement stream goes to a temporary file in the target's own
//! directory (same filesystem, so the final rename is atomic), is flushed
//! and fsynced, and only then renamed over the original. The temp file is
//! an RAII resource: every non-commit exit path — errors, early returns,
//! panics — removes it on drop, and the original is never touched in
//! place.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{RestoreError, Result};

/// What the engine did (or would do) for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Bytes committed over the original.
    Written,
    /// Dry-run: every step performed except the final rename.
    WouldWrite,
}

/// Replace `target`'s contents with `bytes` atomically.
///
/// In dry-run mode the temporary file is still written and synced — the
/// full failure surface is exercised — but the rename is skipped and the
/// temp file is removed, leaving the target byte-identical.
pub fn commit(target: &Path, bytes: &[u8], dry_run: bool) -> Result<CommitOutcome> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    if dry_run {
        log::debug!("dry-run: would replace {}", target.display());
        // tmp dropped here, removing the temporary file.
        return Ok(CommitOutcome::WouldWrite);
    }

    tmp.persist(target).map_err(|e| {
        // The temp file inside the error is dropped (and removed); the
        // original has not been renamed over and is intact.
        RestoreError::Io(e.error)
    })?;

    // Make the rename itself durable. Failing to sync the directory does
    // not lose data already on disk, so this is best-effort.
    if let Ok(dir_handle) = std::fs::File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    log::debug!("committed {} bytes to {}", bytes.len(), target.display());
    Ok(CommitOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dir_entry_count(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn commit_replaces_target_atomically() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.jpg");
        fs::write(&target, b"original").unwrap();

        let outcome = commit(&target, b"replacement", false).unwrap();
        assert_eq!(outcome, CommitOutcome::Written);
        assert_eq!(fs::read(&target).unwrap(), b"replacement");
        assert_eq!(dir_entry_count(dir.path()), 1, "no temp residue");
    }

    #[test]
    fn dry_run_leaves_target_and_no_residue() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.jpg");
        fs::write(&target, b"original").unwrap();

        let outcome = commit(&target, b"replacement", true).unwrap();
        assert_eq!(outcome, CommitOutcome::WouldWrite);
        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert_eq!(dir_entry_count(dir.path()), 1, "temp file must be cleaned up");
    }

    #[test]
    fn commit_creates_target_when_absent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("new.bin");

        commit(&target, b"data", false).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"data");
    }

    #[test]
    fn failed_commit_leaves_original_intact() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.jpg");
        fs::write(&target, b"original").unwrap();

        // Renaming over a non-empty directory fails on every platform;
        // point the commit at a directory path to force the persist step
        // to fail after the temp write succeeded.
        let blocked = dir.path().join("blocked");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("occupant"), b"x").unwrap();

        let result = commit(&blocked, b"replacement", false);
        assert!(result.is_err());
        assert_eq!(fs::read(&target).unwrap(), b"original");
        // Temp file from the failed attempt is gone.
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 2, "only target and blocked dir remain: {names:?}");
    }
}
