// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use sven_config::{AgentMode, CompactionStrategy};
use sven_tools::{events::TodoItem, ToolCall};

/// Which compaction path actually ran, reported alongside `ContextCompacted`
/// so consumers can tell a model-authored summary from a deterministic drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategyUsed {
    /// Deterministic drop of old messages; no model call was made. Used when
    /// there is nothing to summarize or the compaction call itself would
    /// overflow the budget.
    Emergency,
    /// Structured (tagged-section) summary produced by a model call.
    Structured,
    /// Free-form narrative summary produced by a model call.
    Narrative,
}

impl From<CompactionStrategy> for CompactionStrategyUsed {
    fn from(s: CompactionStrategy) -> Self {
        match s {
            CompactionStrategy::Structured => CompactionStrategyUsed::Structured,
            CompactionStrategy::Narrative => CompactionStrategyUsed::Narrative,
        }
    }
}

/// Opaque identifier for a sub-agent spawned via `spawn_subagent` or as a
/// member of a `spawn_team` run. Lets `Subagent*`/`Team*` events route to the
/// right place in a TUI or transcript without threading a back-pointer
/// through the child `Agent`.
pub type SubagentId = String;

/// Events emitted by the agent during a single turn.
/// Consumers (CI runner, TUI, websocket serve-mode) subscribe to these to
/// drive their output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model
    TextDelta(String),
    /// A complete text response from the model (after streaming finishes)
    TextComplete(String),
    /// A thinking/reasoning chunk from the model (extended thinking API).
    /// Consumers should accumulate deltas and finalise them into a Thinking
    /// segment when the model signals the end of the reasoning block.
    ThinkingDelta(String),
    /// A complete thinking/reasoning block (accumulated from ThinkingDelta events).
    ThinkingComplete(String),
    /// The model has requested a tool call
    ToolCallStarted(ToolCall),
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Context was compacted; statistics and the strategy actually used.
    ContextCompacted {
        /// Number of messages in the session before compaction.
        before_count: usize,
        /// Number of messages in the session after compaction.
        after_count: usize,
        /// Tokens freed by compaction (`tokens_before - tokens_after`).
        tokens_saved: usize,
        tokens_before: usize,
        tokens_after: usize,
        strategy: CompactionStrategyUsed,
        turn: u32,
    },
    /// Current token usage update for the turn just completed.
    TokenUsage {
        input: u32,
        output: u32,
        /// Tokens served from the provider's prompt cache this turn.
        cache_read: u32,
        /// Tokens written into the provider's prompt cache this turn.
        cache_write: u32,
        /// Cumulative prompt-cache tokens read across the session.
        cache_read_total: u32,
        /// Cumulative prompt-cache tokens written across the session.
        cache_write_total: u32,
        /// The model's context window, for consumers rendering a fraction bar.
        max_tokens: usize,
    },
    /// The agent has finished processing the current user turn
    TurnComplete,
    /// The turn loop stopped mid-stream: cancellation, a stream error after
    /// partial text, or a terminal condition hit while text was still being
    /// produced. `partial_text` is whatever was streamed before the abort.
    Aborted { partial_text: String },
    /// A recoverable error occurred
    Error(String),
    /// The todo list was updated
    TodoUpdate(Vec<TodoItem>),
    /// The agent mode was changed
    ModeChanged(AgentMode),
    /// The agent is asking the user a question (id links to QuestionAnswer)
    Question { id: String, questions: Vec<String> },
    /// Answer to a previous Question event
    QuestionAnswer { id: String, answer: String },

    /// `maxBudgetUsd` was exceeded; the turn loop stops before the next
    /// model call. Both the running total and the limit are reported so
    /// consumers don't need to re-derive the overage.
    BudgetExceeded { spent_usd: f64, limit_usd: f64 },
    /// `maxTurns` was reached; the turn loop stops before starting another
    /// turn.
    TurnLimitReached { turns: u32, limit: u32 },
    /// The loop detector tripped and the turn loop bailed out of the current
    /// turn early. `reason` is a short human-readable description (e.g.
    /// "identical tool call repeated 4 times in last 20 calls").
    Bailed { reason: String },

    /// A sub-agent (spawned via the task tool) started running.
    SubagentStart { id: SubagentId, description: String },
    /// A sub-agent streamed a text update.
    SubagentProgress { id: SubagentId, text: String },
    /// A sub-agent started a tool call.
    SubagentToolStart { id: SubagentId, tool_name: String },
    /// A sub-agent's tool call finished.
    SubagentToolEnd {
        id: SubagentId,
        tool_name: String,
        is_error: bool,
    },
    /// A sub-agent finished, successfully or not.
    SubagentDone {
        id: SubagentId,
        result: String,
        is_error: bool,
    },

    /// A team of sub-agents started running.
    TeamStart { team_id: String, member_count: usize },
    /// A team member reported progress on its assigned task.
    TeamProgress {
        team_id: String,
        member_id: SubagentId,
        text: String,
    },
    /// A single task within a team run finished (one member, one task).
    TeamTask {
        team_id: String,
        member_id: SubagentId,
        task: String,
        is_error: bool,
    },
    /// The whole team run finished; `results` preserves task order.
    TeamDone {
        team_id: String,
        results: Vec<(SubagentId, String)>,
        /// Number of tasks that completed without error.
        tasks_completed: usize,
        /// Total number of tasks dispatched across the team.
        tasks_total: usize,
        /// `true` iff every task completed without error.
        success: bool,
    },
}
