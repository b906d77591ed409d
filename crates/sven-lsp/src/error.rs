// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Errors surfaced by the LSP session manager.
///
/// `Timeout` and `ServerDown` are the two variants callers are expected to
/// match on (the tool dispatcher turns `Timeout` into a tool_result and
/// `ServerDown` into a respawn-on-next-request); everything else is surfaced
/// as plain text in the tool_result body.
#[derive(Debug, Error)]
pub enum LspError {
    #[error("no language server binary found for language '{0}'")]
    BinaryNotFound(String),

    #[error("failed to spawn language server for '{0}': {1}")]
    Spawn(String, #[source] std::io::Error),

    #[error("language server for '{0}' exited")]
    ServerDown(String),

    #[error("request '{0}' timed out after {1:?}")]
    Timeout(&'static str, std::time::Duration),

    #[error("malformed LSP message: {0}")]
    Protocol(String),

    #[error("i/o error talking to language server: {0}")]
    Io(#[from] std::io::Error),

    #[error("language server returned an error response: {0}")]
    Response(String),

    #[error("file not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, LspError>;
