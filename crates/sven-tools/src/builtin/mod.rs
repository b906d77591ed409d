// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod apply_patch;
pub mod ask_question;
pub mod delete_file;
pub mod edit_file;
pub mod find_file;
pub mod fs;
pub mod glob_file_search;
pub mod grep;
pub mod list_dir;
pub mod list_knowledge;
pub mod load_skill;
pub mod read_file;
pub mod read_image;
pub mod read_lints;
pub mod run_terminal_command;
pub mod search_codebase;
pub mod search_knowledge;
pub mod switch_mode;
pub mod todo_write;
pub mod update_memory;
pub mod web_fetch;
pub mod web_search;
pub mod write_file;

// Legacy modules kept for backwards compatibility
pub mod glob;
pub mod shell;

// LSP-backed tools (category = lsp), gated on the sven-lsp crate.
pub mod lsp;
