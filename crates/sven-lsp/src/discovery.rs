// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Canonical language ids and binary discovery (system PATH first, bundled
//! fallback second).

use std::path::{Path, PathBuf};

use crate::error::{LspError, Result};

/// One entry describing how to launch a server for a canonical language id.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub language_id: &'static str,
    /// Candidate binary names tried in order (first match on PATH wins).
    pub candidates: &'static [&'static str],
    pub args: &'static [&'static str],
    /// File extensions this server should be used for.
    pub extensions: &'static [&'static str],
}

/// Built-in registry of common language servers. Not exhaustive — this is the
/// ambient table the manager consults before falling back to an explicit
/// override from configuration.
pub const SERVERS: &[ServerSpec] = &[
    ServerSpec {
        language_id: "rust",
        candidates: &["rust-analyzer"],
        args: &[],
        extensions: &["rs"],
    },
    ServerSpec {
        language_id: "typescript",
        candidates: &["typescript-language-server"],
        args: &["--stdio"],
        extensions: &["ts", "tsx", "js", "jsx", "mjs", "cjs"],
    },
    ServerSpec {
        language_id: "python",
        candidates: &["pyright-langserver", "pylsp"],
        args: &["--stdio"],
        extensions: &["py", "pyi"],
    },
    ServerSpec {
        language_id: "go",
        candidates: &["gopls"],
        args: &[],
        extensions: &["go"],
    },
    ServerSpec {
        language_id: "c",
        candidates: &["clangd"],
        args: &[],
        extensions: &["c", "h"],
    },
    ServerSpec {
        language_id: "cpp",
        candidates: &["clangd"],
        args: &[],
        extensions: &["cpp", "cc", "cxx", "hpp", "hh"],
    },
];

/// Canonicalize a free-form language hint (file extension or already-an-id)
/// into the stable `languageId` key used by [`SERVERS`] and by the
/// `LSPServerRecord` keying scheme.
pub fn canonical_language_id(hint: &str) -> Option<&'static str> {
    let hint = hint.trim_start_matches('.').to_ascii_lowercase();
    SERVERS
        .iter()
        .find(|s| s.language_id == hint || s.extensions.contains(&hint.as_str()))
        .map(|s| s.language_id)
}

/// Canonical language id for a file path, from its extension.
pub fn language_id_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    canonical_language_id(ext)
}

fn spec_for(language_id: &str) -> Option<&'static ServerSpec> {
    SERVERS.iter().find(|s| s.language_id == language_id)
}

/// Locate a usable binary for `language_id`: check `$PATH` for each
/// candidate name in order, then a bundled fallback directory
/// (`<data_dir>/bundled-lsp/<candidate>`), in that order.
pub fn discover_binary(language_id: &str, bundled_dir: Option<&Path>) -> Result<(PathBuf, Vec<String>)> {
    let spec = spec_for(language_id).ok_or_else(|| LspError::BinaryNotFound(language_id.to_string()))?;

    for candidate in spec.candidates {
        if let Some(found) = which(candidate) {
            return Ok((found, spec.args.iter().map(|s| s.to_string()).collect()));
        }
    }
    if let Some(dir) = bundled_dir {
        for candidate in spec.candidates {
            let path = dir.join(candidate);
            if path.is_file() {
                return Ok((path, spec.args.iter().map(|s| s.to_string()).collect()));
            }
        }
    }
    Err(LspError::BinaryNotFound(language_id.to_string()))
}

/// Minimal `$PATH` search — the standard library does not expose one.
fn which(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        candidate.is_file().then_some(candidate)
    })
}
