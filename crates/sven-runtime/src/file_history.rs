// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pre-edit file-backup ring.
//!
//! Every fs-mutating tool (`write`, `edit_file`, `apply_patch`) copies the
//! target file aside *before* overwriting it, so a bad edit can always be
//! recovered by hand from the backup directory. Backups for one session live
//! under `file-history/{sid}/`, capped at [`MAX_BACKUPS_PER_SESSION`] with
//! FIFO eviction — the same capped-queue idea `LoopDetector` uses for its
//! `failed_strategies` set, applied to files on disk instead of call hashes.

use std::path::{Path, PathBuf};

/// Maximum number of backup copies kept per session before the oldest are
/// evicted.
const MAX_BACKUPS_PER_SESSION: usize = 100;

/// Returns `$XDG_DATA_HOME/sven` (i.e. `~/.local/share/sven`), the same base
/// directory conversation history and the debug log live under.
fn base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join("sven")
}

/// Pre-edit backup ring for a single agent session.
pub struct FileHistory {
    root: PathBuf,
    session_id: String,
}

impl FileHistory {
    /// A ring rooted at the default `$XDG_DATA_HOME/sven/file-history/` tree.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_root(base_dir(), session_id)
    }

    /// A ring rooted at an explicit base directory — used by tests so they
    /// don't touch the real XDG data directory.
    pub fn with_root(root: PathBuf, session_id: impl Into<String>) -> Self {
        Self { root, session_id: session_id.into() }
    }

    fn session_dir(&self) -> PathBuf {
        self.root.join("file-history").join(&self.session_id)
    }

    /// Copy `path`'s current content into this session's backup ring, then
    /// evict the oldest copies past the cap. Does nothing if `path` does not
    /// yet exist (first write to a brand-new file has nothing to back up).
    pub fn backup(&self, path: &Path) -> std::io::Result<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }

        let dir = self.session_dir();
        create_dir_0700(&dir)?;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        let backup_path = dir.join(format!("{nanos}_{name}"));
        std::fs::copy(path, &backup_path)?;

        self.evict(&dir)?;
        Ok(Some(backup_path))
    }

    /// Trim the session's backup directory down to [`MAX_BACKUPS_PER_SESSION`]
    /// entries, removing the oldest first (filenames are nanosecond-prefixed
    /// so lexical order is chronological order).
    fn evict(&self, dir: &Path) -> std::io::Result<()> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        if entries.len() <= MAX_BACKUPS_PER_SESSION {
            return Ok(());
        }
        entries.sort();
        let excess = entries.len() - MAX_BACKUPS_PER_SESSION;
        for stale in entries.into_iter().take(excess) {
            let _ = std::fs::remove_file(stale);
        }
        Ok(())
    }
}

#[cfg(unix)]
fn create_dir_0700(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_dir_0700(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sven_file_history_test_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn backup_of_nonexistent_file_is_noop() {
        let root = tmp_root("noop");
        let fh = FileHistory::with_root(root.clone(), "s1");
        let result = fh.backup(&root.join("does_not_exist.txt")).unwrap();
        assert!(result.is_none());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn backup_copies_file_content() {
        let root = tmp_root("copy");
        std::fs::create_dir_all(&root).unwrap();
        let target = root.join("target.txt");
        std::fs::write(&target, "original content").unwrap();

        let fh = FileHistory::with_root(root.clone(), "s2");
        let backup_path = fh.backup(&target).unwrap().expect("backup should be created");
        assert_eq!(std::fs::read_to_string(&backup_path).unwrap(), "original content");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn backups_are_scoped_per_session() {
        let root = tmp_root("scoped");
        std::fs::create_dir_all(&root).unwrap();
        let target = root.join("target.txt");
        std::fs::write(&target, "v1").unwrap();

        let fh_a = FileHistory::with_root(root.clone(), "session-a");
        let fh_b = FileHistory::with_root(root.clone(), "session-b");
        fh_a.backup(&target).unwrap();
        fh_b.backup(&target).unwrap();

        assert!(root.join("file-history").join("session-a").exists());
        assert!(root.join("file-history").join("session-b").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn fifo_eviction_caps_backups_at_limit() {
        let root = tmp_root("evict");
        std::fs::create_dir_all(&root).unwrap();
        let target = root.join("target.txt");

        let fh = FileHistory::with_root(root.clone(), "s3");
        for i in 0..MAX_BACKUPS_PER_SESSION + 10 {
            std::fs::write(&target, format!("version {i}")).unwrap();
            fh.backup(&target).unwrap();
        }

        let count = std::fs::read_dir(fh.session_dir()).unwrap().count();
        assert_eq!(count, MAX_BACKUPS_PER_SESSION);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[test]
    fn session_dir_has_0700_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let root = tmp_root("perms");
        std::fs::create_dir_all(&root).unwrap();
        let target = root.join("target.txt");
        std::fs::write(&target, "x").unwrap();

        let fh = FileHistory::with_root(root.clone(), "s4");
        fh.backup(&target).unwrap();

        let mode = std::fs::metadata(fh.session_dir()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
        let _ = std::fs::remove_dir_all(&root);
    }
}
