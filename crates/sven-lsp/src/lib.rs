// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! LSP Session Manager — per-(language, workspace) language-server
//! processes, with open/sync/query and readiness probes.
//!
//! No direct counterpart in the teacher crate (it has no LSP integration at
//! all). Grounded on two teacher patterns combined: `sven-mcp`'s
//! stdio-transport server wrapper for the transport layer (generalized from
//! newline-delimited to the LSP wire format's `Content-Length:`-prefixed
//! framing), and `sven-node/src/control/service.rs`'s
//! `HashMap<Uuid, Session>` + oneshot-reply-per-pending-request pattern for
//! the per-server pending-request table and its 30s timeout enforcement.

pub mod client;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod ops;
pub mod sync;
pub mod transport;

pub use client::LspClient;
pub use discovery::{canonical_language_id, language_id_for_path};
pub use error::{LspError, Result};
pub use manager::{LspManager, ServerHandle};
pub use ops::Position;
