// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Constructs the `sven_core::Agent` that powers a serve-mode conversation.
//!
//! Uses the same standard toolset as the TUI/CI runner — the node exposes no
//! tools of its own; it is a transport, not a different agent. Each call
//! builds a fresh `Agent`, scoped to the caller-supplied `session_id` so the
//! file-backup ring and the session's own bookkeeping line up.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use sven_config::Config;
use sven_core::{Agent, AgentRuntimeContext};
use sven_runtime::FileHistory;
use sven_tools::{
    DeleteFileTool, EditFileTool, FindFileTool, GrepTool, ListDirTool, ReadFileTool, ReadLintsTool,
    RunTerminalCommandTool, SwitchModeTool, TodoItem, TodoWriteTool, ToolEvent, ToolRegistry,
    UpdateMemoryTool, WebFetchTool, WebSearchTool, WriteTool,
};

/// Build a fresh `Agent` for one serve-mode conversation.
///
/// `session_id` scopes the tool registry's file-backup ring
/// (`file-history/{session_id}/`) and becomes the Agent's session id.
pub async fn build_gateway_agent(
    config: &Arc<Config>,
    model: Arc<dyn sven_model::ModelProvider>,
    session_id: &str,
) -> anyhow::Result<Agent> {
    let max_ctx = model.catalog_context_window().unwrap_or(128_000) as usize;

    let mode = Arc::new(Mutex::new(config.agent.default_mode));
    let (tool_tx, tool_rx) = mpsc::channel::<ToolEvent>(64);
    let todos: Arc<Mutex<Vec<TodoItem>>> = Arc::new(Mutex::new(Vec::new()));
    let file_history = Arc::new(FileHistory::new(session_id));

    let mut registry = ToolRegistry::new();
    registry.register(RunTerminalCommandTool::default());
    registry.register(ReadFileTool);
    registry.register(WriteTool::new(file_history.clone()));
    registry.register(EditFileTool::new(file_history.clone()));
    registry.register(FindFileTool);
    registry.register(GrepTool);
    registry.register(ListDirTool);
    registry.register(DeleteFileTool);
    registry.register(WebFetchTool);
    registry.register(WebSearchTool {
        api_key: config.tools.web.search.api_key.clone(),
    });
    registry.register(ReadLintsTool);
    registry.register(UpdateMemoryTool {
        memory_file: config.tools.memory.memory_file.clone(),
    });
    registry.register(TodoWriteTool::new(todos, tool_tx.clone()));
    registry.register(SwitchModeTool::new(mode.clone(), tool_tx));

    Ok(Agent::with_session_id(
        model,
        Arc::new(registry),
        Arc::new(config.agent.clone()),
        AgentRuntimeContext::default(),
        mode,
        tool_rx,
        max_ctx,
        session_id.to_string(),
    ))
}
