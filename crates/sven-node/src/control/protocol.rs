// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Wire protocol between a serve-mode websocket client and the gateway.
//!
//! JSON over WebSocket text frames — comfortable for browsers and easy to
//! read in the network tab while debugging.
//!
//! # Connection flow
//!
//! ```text
//! Client                              Gateway
//!    │◄─ ready{version, tools[]} ─────────│  sent once, right after upgrade
//!    │                                     │
//!    │── query{prompt} ───────────────────►│
//!    │◄─ conversation_created{id} ─────────│  (only if no conversationId was given)
//!    │◄─ started{model, conversationId} ───│
//!    │◄─ text{delta, role} ────────────────│  ... repeated ...
//!    │◄─ tool_start{callId, toolName} ─────│  (if a tool is invoked)
//!    │◄─ tool_result{callId, output} ──────│
//!    │◄─ done{usage, conversationId} ──────│
//!    │                                     │
//!    │── abort ───────────────────────────►│  cancels the in-flight turn
//!    │◄─ aborted ──────────────────────────│  within 100 ms
//! ```
//!
//! # JSON codec example
//!
//! ```rust
//! # use sven_node::control::protocol::*;
//! let cmd = ControlCommand::Query {
//!     prompt: "refactor the auth module".to_string(),
//!     store_id: None,
//!     conversation_id: None,
//!     config: None,
//! };
//! let json = serde_json::to_string(&cmd).unwrap();
//! let back: ControlCommand = serde_json::from_str(&json).unwrap();
//! assert!(matches!(back, ControlCommand::Query { .. }));
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Client → Gateway commands ──────────────────────────────────────────────────

/// Commands sent by a serve-mode client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Submit a prompt and run a turn on this connection.
    ///
    /// `conversation_id` resumes an existing conversation (loaded from the
    /// session store if it is not already the connection's current one);
    /// when omitted, a new conversation is minted and announced via
    /// `conversation_created` before `started`.
    #[serde(rename_all = "camelCase")]
    Query {
        prompt: String,
        #[serde(default)]
        store_id: Option<String>,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        config: Option<serde_json::Value>,
    },

    /// Cancel the turn currently running on this connection. Must stop the
    /// stream and emit `aborted` within 100 ms.
    Abort,

    /// Liveness check; answered with `pong`.
    Ping,

    /// List the tools available to the agent.
    GetTools,

    /// Start a new, empty conversation on this connection without
    /// submitting a prompt. Answered with `conversation_created`.
    NewConversation,

    /// Switch this connection to a previously saved conversation.
    /// Answered with `conversation_loaded` or `error`.
    #[serde(rename_all = "camelCase")]
    LoadConversation { conversation_id: Uuid },

    /// List saved conversations. Answered with `conversations`.
    GetConversations,
}

// ── Gateway → Client events ────────────────────────────────────────────────────

/// Events emitted by the gateway to a serve-mode client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// Sent once, immediately after the websocket upgrade.
    Ready {
        version: String,
        tools: Vec<ToolInfo>,
    },

    /// A new conversation id was minted — in response to `query` with no
    /// `conversationId`, or to `new_conversation`.
    #[serde(rename_all = "camelCase")]
    ConversationCreated { conversation_id: Uuid },

    /// A turn began running.
    #[serde(rename_all = "camelCase")]
    Started { model: String, conversation_id: Uuid },

    /// A streaming text delta. `role` is `"assistant"` or `"thinking"`.
    Text { delta: String, role: String },

    /// The model requested a tool call.
    #[serde(rename_all = "camelCase")]
    ToolStart {
        call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },

    /// A tool call completed. `output` is truncated to 10 KiB with a visible
    /// truncation marker for oversized bodies.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        call_id: String,
        output: String,
        is_error: bool,
    },

    /// The turn completed normally.
    #[serde(rename_all = "camelCase")]
    Done {
        usage: UsageSummary,
        conversation_id: Uuid,
    },

    /// The turn or command failed.
    Error { message: String },

    /// The turn was cancelled via `abort`.
    Aborted,

    /// Response to `ping`.
    Pong,

    /// Response to `get_tools`.
    Tools { tools: Vec<ToolInfo> },

    /// Response to `get_conversations`, most recently updated first.
    Conversations { conversations: Vec<ConversationSummary> },

    /// Response to `load_conversation`.
    #[serde(rename_all = "camelCase")]
    ConversationLoaded {
        conversation_id: Uuid,
        messages: Vec<sven_model::Message>,
    },

    /// A diagnostic event: mode changes, todo updates, context compaction,
    /// sub-agent/team progress — agent bookkeeping that doesn't warrant its
    /// own wire event but is useful for an attached debugger or log viewer.
    Debug { message: String },
}

// ── Supporting types ──────────────────────────────────────────────────────────

/// Summary of a tool returned by `ready`/`get_tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Token/cost accounting reported on `done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub cost_usd: f64,
}

/// Summary of a saved conversation returned by `get_conversations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub updated_at: String,
}

// ── Unit tests ────────────────────────────────────────────────────────────────
