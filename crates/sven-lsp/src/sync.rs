// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-server open-file cache: tracks which files have been `didOpen`ed and
//! at what version/content-hash, so repeated queries on an unchanged file are
//! no-ops and changed files get exactly one `didChange` before the next
//! query.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};

/// One file's sync state as tracked by a single language-server connection.
#[derive(Debug, Clone)]
pub struct OpenFileState {
    pub version: i64,
    pub content_hash: String,
    pub mtime_ms: u128,
}

/// Tracks `openedFiles: map{uri -> {version, contentHash, mtimeMs}}` for one
/// server, plus the one-shot `projectIndexed` flag gating the initial empty
/// `workspace/symbol` probe.
#[derive(Debug, Default)]
pub struct FileSyncCache {
    opened: HashMap<String, OpenFileState>,
    pub project_indexed: bool,
}

/// What the caller must do before issuing a query against `path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Not previously opened: send `didOpen`, then probe.
    Open,
    /// Already opened; on-disk content changed: send `didChange`, then probe.
    Change,
    /// Already opened and unchanged: no-op.
    NoOp,
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

impl FileSyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what sync step (if any) `uri` needs given its current on-disk
    /// `text` and `mtime_ms`. Does not mutate the cache — call
    /// [`FileSyncCache::record`] after the corresponding LSP notification is
    /// actually sent.
    pub fn plan(&self, uri: &str, text: &str, mtime_ms: u128) -> SyncAction {
        match self.opened.get(uri) {
            None => SyncAction::Open,
            Some(state) => {
                if state.mtime_ms == mtime_ms {
                    SyncAction::NoOp
                } else if state.content_hash == content_hash(text) {
                    // mtime moved (e.g. touch) but content identical: still a no-op.
                    SyncAction::NoOp
                } else {
                    SyncAction::Change
                }
            }
        }
    }

    /// Record that `uri` is now open/synced at `text`/`mtime_ms`, bumping its
    /// version counter on a `Change`.
    pub fn record(&mut self, uri: &str, text: &str, mtime_ms: u128) -> i64 {
        let hash = content_hash(text);
        let version = match self.opened.get(uri) {
            Some(prev) => prev.version + 1,
            None => 1,
        };
        self.opened.insert(
            uri.to_string(),
            OpenFileState {
                version,
                content_hash: hash,
                mtime_ms,
            },
        );
        version
    }

    /// Invalidate the cached mtime for `uri` so the next [`FileSyncCache::plan`]
    /// call reports [`SyncAction::Change`] even if the mtime on disk has not
    /// moved yet (covers editor-external writes made through local tools).
    pub fn invalidate(&mut self, uri: &str) {
        if let Some(state) = self.opened.get_mut(uri) {
            state.mtime_ms = u128::MAX;
        }
    }

    pub fn is_open(&self, uri: &str) -> bool {
        self.opened.contains_key(uri)
    }
}

/// Convert a filesystem path to a `file://` URI (enough for local single-root
/// language servers; no percent-encoding of exotic characters).
pub fn path_to_uri(path: &Path) -> String {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    format!("file://{}", abs.display())
}
