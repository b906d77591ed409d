// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`LspManager`] — one child language-server process per
//! `(languageId, workspaceRoot)` pair, spawned lazily and reused across
//! queries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::client::LspClient;
use crate::discovery::{discover_binary, language_id_for_path};
use crate::error::{LspError, Result};
use crate::sync::{content_hash, path_to_uri, FileSyncCache, SyncAction};

/// Key identifying one running server instance.
pub type ServerKey = (String, PathBuf);

/// One running (or recently-dead) server and its per-file sync cache.
pub struct ServerHandle {
    pub language_id: String,
    pub workspace_root: PathBuf,
    client: LspClient,
    sync: Mutex<FileSyncCache>,
}

/// Owns every live language-server process for the current conversation.
///
/// Single-owner within one conversation (per §5 of the spec this document
/// implements): sub-agents get their own fresh `LspManager`, they do not
/// share server handles with the parent's manager.
pub struct LspManager {
    servers: RwLock<HashMap<ServerKey, Arc<ServerHandle>>>,
    bundled_dir: Option<PathBuf>,
}

impl LspManager {
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            bundled_dir: dirs::data_dir().map(|d| d.join("sven").join("bundled-lsp")),
        }
    }

    pub fn with_bundled_dir(bundled_dir: Option<PathBuf>) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            bundled_dir,
        }
    }

    /// Get the live server for `(language_id, workspace_root)`, spawning and
    /// initializing one if none exists yet or the previous one has died.
    pub async fn get_or_spawn(
        &self,
        language_id: &str,
        workspace_root: &Path,
    ) -> Result<Arc<ServerHandle>> {
        let key: ServerKey = (language_id.to_string(), workspace_root.to_path_buf());

        if let Some(handle) = self.servers.read().await.get(&key).cloned() {
            if handle.client.is_alive() {
                return Ok(handle);
            }
            warn!(language_id, root = %workspace_root.display(), "lsp: server found dead, respawning");
        }

        let (binary, args) = discover_binary(language_id, self.bundled_dir.as_deref())?;
        info!(language_id, binary = %binary.display(), "lsp: spawning server");
        let client = LspClient::spawn(&binary.to_string_lossy(), &args, workspace_root)?;

        let root_uri = path_to_uri(workspace_root);
        client
            .request(
                "initialize",
                json!({
                    "processId": std::process::id(),
                    "rootUri": root_uri,
                    "capabilities": {},
                }),
            )
            .await?;
        client.notify("initialized", json!({}))?;

        let handle = Arc::new(ServerHandle {
            language_id: language_id.to_string(),
            workspace_root: workspace_root.to_path_buf(),
            client,
            sync: Mutex::new(FileSyncCache::new()),
        });
        self.servers.write().await.insert(key, handle.clone());
        Ok(handle)
    }

    /// Resolve the canonical language id for `path` and spawn/reuse the
    /// server for `(language_id, workspace_root)`.
    pub async fn server_for_path(
        &self,
        path: &Path,
        workspace_root: &Path,
    ) -> Result<Arc<ServerHandle>> {
        let language_id = language_id_for_path(path)
            .ok_or_else(|| LspError::BinaryNotFound(format!("{}", path.display())))?;
        self.get_or_spawn(language_id, workspace_root).await
    }

    /// Ensure `path` is open and up to date on `handle`'s server before a
    /// query runs: `didOpen`/`didChange` as needed, each followed by an
    /// awaited `documentSymbol` probe to force a (re)parse. On the very
    /// first open for this server, also probes empty `workspace/symbol` to
    /// force whole-project indexing.
    pub async fn ensure_synced(&self, handle: &ServerHandle, path: &Path) -> Result<()> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| LspError::FileNotFound(path.display().to_string()))?;
        let mtime_ms = tokio::fs::metadata(path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let uri = path_to_uri(path);

        let action = {
            let sync = handle.sync.lock().await;
            sync.plan(&uri, &text, mtime_ms)
        };

        match action {
            SyncAction::NoOp => {}
            SyncAction::Open => {
                handle.client.notify(
                    "textDocument/didOpen",
                    json!({"textDocument": {
                        "uri": uri, "languageId": handle.language_id,
                        "version": 1, "text": text,
                    }}),
                )?;
                handle
                    .client
                    .request(
                        "textDocument/documentSymbol",
                        json!({"textDocument": {"uri": uri}}),
                    )
                    .await?;

                let project_indexed = {
                    let sync = handle.sync.lock().await;
                    sync.project_indexed
                };
                if !project_indexed {
                    handle
                        .client
                        .request("workspace/symbol", json!({"query": ""}))
                        .await?;
                    let mut sync = handle.sync.lock().await;
                    sync.project_indexed = true;
                }
            }
            SyncAction::Change => {
                let version = {
                    let mut sync = handle.sync.lock().await;
                    sync.record(&uri, &text, mtime_ms)
                };
                handle.client.notify(
                    "textDocument/didChange",
                    json!({
                        "textDocument": {"uri": uri, "version": version},
                        "contentChanges": [{"text": text}],
                    }),
                )?;
                handle
                    .client
                    .request(
                        "textDocument/documentSymbol",
                        json!({"textDocument": {"uri": uri}}),
                    )
                    .await?;
                return Ok(());
            }
        }

        let mut sync = handle.sync.lock().await;
        sync.record(&uri, &text, mtime_ms);
        Ok(())
    }

    /// Invalidate the cached mtime for `path` across every live server that
    /// has it open, so the next query issues exactly one `didChange` before
    /// its operation request (invariant 6 of the testable properties).
    pub async fn notify_file_changed(&self, path: &Path) {
        let uri = path_to_uri(path);
        let servers = self.servers.read().await;
        for handle in servers.values() {
            let mut sync = handle.sync.lock().await;
            if sync.is_open(&uri) {
                sync.invalidate(&uri);
            }
        }
    }

    /// `shutdown` + `exit` every live server, killing after the grace period.
    pub async fn shutdown_all(&self) {
        let servers = self.servers.write().await;
        for handle in servers.values() {
            handle.client.shutdown().await;
        }
    }

    pub async fn server_count(&self) -> usize {
        self.servers.read().await.len()
    }
}

impl Default for LspManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerHandle {
    /// Issue a request against this server's client.
    pub async fn request(&self, method: &'static str, params: Value) -> Result<Value> {
        self.client.request(method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_includes_language_and_root() {
        let a: ServerKey = ("rust".into(), PathBuf::from("/p1"));
        let b: ServerKey = ("rust".into(), PathBuf::from("/p2"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn get_or_spawn_fails_closed_for_unknown_language() {
        let mgr = LspManager::new();
        let err = mgr
            .get_or_spawn("not-a-real-language", Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, LspError::BinaryNotFound(_)));
    }

    #[tokio::test]
    async fn server_count_starts_at_zero() {
        let mgr = LspManager::new();
        assert_eq!(mgr.server_count().await, 0);
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
