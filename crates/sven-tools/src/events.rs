use sven_config::AgentMode;

/// A structured todo item managed by the todo_write tool.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    /// One of: "pending", "in_progress", "completed", "cancelled"
    pub status: String,
}

/// Opaque identifier for a spawned sub-agent, unique within the parent's
/// session. Shared with `sven_core::events::SubagentId`.
pub type SubagentId = String;

/// Events emitted by tools to communicate state changes back to the agent loop.
/// The agent translates these into `AgentEvent` variants for the UI.
///
/// The `Subagent*`/`Team*` variants are relayed by `task` (single sub-agent)
/// and `spawn_team` (concurrent teammates) to report progress on the worker
/// thread each one runs on back into the parent's event stream.
#[derive(Debug)]
pub enum ToolEvent {
    TodoUpdate(Vec<TodoItem>),
    ModeChanged(AgentMode),
    SubagentStart {
        id: SubagentId,
        description: String,
    },
    SubagentProgress {
        id: SubagentId,
        text: String,
    },
    SubagentToolStart {
        id: SubagentId,
        tool_name: String,
    },
    SubagentToolEnd {
        id: SubagentId,
        tool_name: String,
        is_error: bool,
    },
    SubagentDone {
        id: SubagentId,
        result: String,
        is_error: bool,
    },
    TeamStart {
        team_id: SubagentId,
        member_count: usize,
    },
    TeamProgress {
        team_id: SubagentId,
        member_id: SubagentId,
        text: String,
    },
    TeamTask {
        team_id: SubagentId,
        member_id: SubagentId,
        task: String,
        is_error: bool,
    },
    TeamDone {
        team_id: SubagentId,
        results: Vec<(SubagentId, String)>,
        tasks_completed: usize,
        tasks_total: usize,
        success: bool,
    },
}
