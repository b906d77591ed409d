// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Centralised tool-registry builder.
//!
//! All callers (CI runner, conversation runner, TUI, sub-agents) use
//! `build_tool_registry` with the appropriate [`ToolSetProfile`] instead of
//! each inlining their own registration loop.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use sven_config::{AgentMode, Config};
use sven_lsp::LspManager;
use sven_model::ModelProvider;
use sven_tools::{
    events::ToolEvent, ApplyPatchTool, AskQuestionTool, DeleteFileTool, DocumentSymbolTool,
    EditFileTool, FindReferencesTool, FsTool, GlobFileSearchTool, GlobTool, GoToDefinitionTool,
    GoToImplementationTool, GrepTool, HookRunner, HoverTool, IncomingCallsTool,
    ListDirTool, ListKnowledgeTool, LoadSkillTool, OutgoingCallsTool, PrepareCallHierarchyTool,
    ReadFileTool, ReadImageTool, ReadLintsTool, RunTerminalCommandTool, SearchCodebaseTool,
    SearchKnowledgeTool, ShellTool, SwitchModeTool, TodoWriteTool, ToolRegistry, UpdateMemoryTool,
    WebFetchTool, WebSearchTool, WorkspaceSymbolTool, WriteTool,
};

use sven_core::AgentRuntimeContext;
use sven_runtime::FileHistory;

use crate::context::ToolSetProfile;
use crate::task_tool::TaskTool;
use crate::team_tool::SpawnTeamTool;

/// Build a [`ToolRegistry`] populated according to the given `profile`.
///
/// This is the single canonical place where tools are wired up.  Adding a
/// new tool to sven means adding it here once and it will appear in every
/// appropriate profile automatically.
///
/// ### Shared-state parameters
///
/// * `mode_lock` — the **same** `Arc` that will be passed to `Agent::new()`.
///   `SwitchModeTool` holds a clone so that mode changes are immediately
///   visible to the agent loop via `drain_tool_events`.
/// * `tool_event_tx` — the sending half of the channel whose receiving end
///   is passed to `Agent::new()`.  `TodoWriteTool` and `SwitchModeTool` send
///   events here; the agent drains them after each tool execution.
/// * `sub_agent_runtime` — inherited by `TaskTool` sub-agents (project root,
///   CI/git notes, AGENTS.md).  Only used for the `Full` profile; pass
///   `AgentRuntimeContext::default()` otherwise.
/// * `session_id` — scopes the `file-history/{sid}/` pre-edit backup ring
///   shared by `write`, `edit_file`, and `apply_patch`. Must match the
///   session id the caller's `Agent` ends up using (see
///   `Agent::with_session_id`/`Session::with_id`).
pub fn build_tool_registry(
    cfg: &Config,
    model: Arc<dyn ModelProvider>,
    profile: ToolSetProfile,
    mode_lock: Arc<Mutex<AgentMode>>,
    tool_event_tx: mpsc::Sender<ToolEvent>,
    sub_agent_runtime: AgentRuntimeContext,
    session_id: &str,
) -> ToolRegistry {
    let file_history = Arc::new(FileHistory::new(session_id));

    match profile {
        ToolSetProfile::Full {
            question_tx,
            todos,
            task_depth,
        } => {
            let mut reg = ToolRegistry::new();

            reg.register(ReadFileTool);
            reg.register(ReadImageTool);
            reg.register(ListDirTool);
            reg.register(FsTool);
            reg.register(GlobFileSearchTool);
            reg.register(GlobTool);
            reg.register(GrepTool);
            reg.register(SearchCodebaseTool);
            reg.register(WebFetchTool);
            reg.register(WebSearchTool {
                api_key: cfg.tools.web.search.api_key.clone(),
            });
            reg.register(ReadLintsTool);
            reg.register(UpdateMemoryTool {
                memory_file: cfg.tools.memory.memory_file.clone(),
            });
            // Only register ask_question when a TUI channel is available.
            // In headless/CI/sub-agent mode there is no UI to display the modal,
            // so we omit the tool entirely — the model won't attempt to call it.
            if let Some(tx) = question_tx {
                reg.register(AskQuestionTool::new_tui(tx));
            }
            reg.register(TodoWriteTool::new(todos, tool_event_tx.clone()));
            reg.register(SwitchModeTool::new(mode_lock, tool_event_tx.clone()));
            reg.register(WriteTool::new(file_history.clone()));
            reg.register(EditFileTool::new(file_history.clone()));
            reg.register(DeleteFileTool);
            reg.register(ApplyPatchTool::new(file_history.clone()));
            reg.register(RunTerminalCommandTool {
                timeout_secs: cfg.tools.timeout_secs,
            });
            reg.register(ShellTool {
                timeout_secs: cfg.tools.timeout_secs,
            });
            let shared_cfg = Arc::new(cfg.clone());
            reg.register(TaskTool::new(
                model.clone(),
                shared_cfg.clone(),
                task_depth.clone(),
                sub_agent_runtime.clone(),
                tool_event_tx.clone(),
            ));
            reg.register(SpawnTeamTool::new(
                model,
                shared_cfg,
                task_depth,
                sub_agent_runtime.clone(),
                tool_event_tx,
            ));
            reg.register(LoadSkillTool::new(sub_agent_runtime.skills.clone()));
            reg.register(ListKnowledgeTool {
                knowledge: sub_agent_runtime.knowledge.clone(),
            });
            reg.register(SearchKnowledgeTool {
                knowledge: sub_agent_runtime.knowledge.clone(),
            });
            register_lsp_tools(&mut reg);
            reg.set_hooks(HookRunner::new(
                cfg.tools.hooks.pre_tool_use.clone(),
                cfg.tools.hooks.post_tool_use.clone(),
            ));
            reg.set_tool_filter(cfg.tools.allowed.clone(), cfg.tools.disallowed.clone());

            reg
        }

        ToolSetProfile::SubAgent { todos } => {
            let mut reg = ToolRegistry::new();

            reg.register(ReadFileTool);
            reg.register(ReadImageTool);
            reg.register(ListDirTool);
            reg.register(FsTool);
            reg.register(GlobFileSearchTool);
            reg.register(GlobTool);
            reg.register(GrepTool);
            reg.register(SearchCodebaseTool);
            reg.register(WebFetchTool);
            reg.register(WebSearchTool {
                api_key: cfg.tools.web.search.api_key.clone(),
            });
            reg.register(ReadLintsTool);
            reg.register(UpdateMemoryTool {
                memory_file: cfg.tools.memory.memory_file.clone(),
            });
            reg.register(AskQuestionTool::new());
            reg.register(TodoWriteTool::new(todos, tool_event_tx.clone()));
            reg.register(SwitchModeTool::new(mode_lock, tool_event_tx));
            reg.register(WriteTool::new(file_history.clone()));
            reg.register(EditFileTool::new(file_history.clone()));
            reg.register(DeleteFileTool);
            reg.register(ApplyPatchTool::new(file_history.clone()));
            reg.register(RunTerminalCommandTool {
                timeout_secs: cfg.tools.timeout_secs,
            });
            reg.register(ShellTool {
                timeout_secs: cfg.tools.timeout_secs,
            });
            // TaskTool intentionally omitted to limit sub-agent nesting
            reg.register(LoadSkillTool::new(sub_agent_runtime.skills.clone()));
            reg.register(ListKnowledgeTool {
                knowledge: sub_agent_runtime.knowledge.clone(),
            });
            reg.register(SearchKnowledgeTool {
                knowledge: sub_agent_runtime.knowledge.clone(),
            });
            // Sub-agents get their own fresh LspManager (see sven_lsp::LspManager
            // docs) rather than sharing the parent's live server handles.
            register_lsp_tools(&mut reg);
            reg.set_hooks(HookRunner::new(
                cfg.tools.hooks.pre_tool_use.clone(),
                cfg.tools.hooks.post_tool_use.clone(),
            ));
            reg.set_tool_filter(cfg.tools.allowed.clone(), cfg.tools.disallowed.clone());

            reg
        }
    }
}

/// Register every `category = lsp` tool against a freshly created
/// [`LspManager`] shared by all of them (one manager per conversation).
fn register_lsp_tools(reg: &mut ToolRegistry) {
    let manager = Arc::new(LspManager::new());
    reg.register(GoToDefinitionTool { manager: manager.clone() });
    reg.register(FindReferencesTool { manager: manager.clone() });
    reg.register(HoverTool { manager: manager.clone() });
    reg.register(GoToImplementationTool { manager: manager.clone() });
    reg.register(PrepareCallHierarchyTool { manager: manager.clone() });
    reg.register(IncomingCallsTool { manager: manager.clone() });
    reg.register(OutgoingCallsTool { manager: manager.clone() });
    reg.register(DocumentSymbolTool { manager: manager.clone() });
    reg.register(WorkspaceSymbolTool { manager });
}
