// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! TaskTool — spawns a sub-agent to complete a focused sub-task.
//!
//! Moved from `sven-core` to `sven-bootstrap` so that TaskTool can use
//! `build_tool_registry` without creating a circular dependency
//! (sven-core → sven-tools, sven-bootstrap → sven-core + sven-tools).
//!
//! The sub-agent runs on a dedicated OS thread (`spawn_blocking` + its own
//! single-threaded Tokio runtime) rather than inline on the parent's task, so
//! a misbehaving sub-agent can't starve the parent's executor. Its events are
//! relayed back through `tool_event_tx`, tagged with a `SubagentId`, for the
//! parent's `Agent::drain_tool_events` to translate into `AgentEvent`s.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use sven_config::{AgentConfig, AgentMode, Config};
use sven_core::{Agent, AgentEvent, AgentRuntimeContext};

use sven_tools::{
    events::{TodoItem, ToolEvent},
    policy::ApprovalPolicy,
    tool::{Tool, ToolCall, ToolOutput},
};

use crate::context::ToolSetProfile;
use crate::registry::build_tool_registry;

/// Maximum sub-agent nesting depth. Shared between `task` and `spawn_team`
/// via the same `depth` counter, so a team member that itself calls `task`
/// can't nest past this.
pub const MAX_DEPTH: usize = 2;

pub(crate) fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &hex[..8])
}

/// Spawns a sub-agent to complete a focused task and returns its text output.
pub struct TaskTool {
    model: Arc<dyn sven_model::ModelProvider>,
    config: Arc<Config>,
    depth: Arc<AtomicUsize>,
    /// Runtime context to pass to each sub-agent (project root, CI/git notes,
    /// AGENTS.md content).  Sub-agents inherit the parent's context so they
    /// know where to operate.
    sub_agent_runtime: AgentRuntimeContext,
    /// Sends progress back to the parent's `Agent::drain_tool_events`.
    tool_event_tx: mpsc::Sender<ToolEvent>,
}

impl TaskTool {
    pub fn new(
        model: Arc<dyn sven_model::ModelProvider>,
        config: Arc<Config>,
        depth: Arc<AtomicUsize>,
        sub_agent_runtime: AgentRuntimeContext,
        tool_event_tx: mpsc::Sender<ToolEvent>,
    ) -> Self {
        Self {
            model,
            config,
            depth,
            sub_agent_runtime,
            tool_event_tx,
        }
    }
}

/// Build and run one sub-agent on a dedicated worker thread, relaying its
/// events through `relay_tx` tagged with `subagent_id`. Shared by `TaskTool`
/// and `sven-bootstrap`'s team worker.
pub(crate) async fn run_subagent_isolated(
    model: Arc<dyn sven_model::ModelProvider>,
    config: Arc<Config>,
    sub_config: AgentConfig,
    sub_agent_runtime: AgentRuntimeContext,
    prompt: String,
    mode: AgentMode,
    subagent_id: String,
    relay_tx: mpsc::Sender<ToolEvent>,
) -> (String, bool) {
    let todos: Arc<Mutex<Vec<TodoItem>>> = Arc::new(Mutex::new(Vec::new()));
    let profile = ToolSetProfile::SubAgent { todos };
    let mode_lock = Arc::new(Mutex::new(mode));
    let (inner_tool_event_tx, inner_tool_event_rx) = mpsc::channel::<ToolEvent>(64);

    // Sub-agents use the SubAgent profile (no TaskTool), so their own
    // recursive task/spawn_team tools aren't registered here.
    let tools = Arc::new(build_tool_registry(
        &config,
        model.clone(),
        profile,
        mode_lock.clone(),
        inner_tool_event_tx,
        AgentRuntimeContext::default(),
        &subagent_id,
    ));

    let context_window = model.catalog_context_window().unwrap_or(128_000) as usize;

    let mut agent = Agent::with_session_id(
        model,
        tools,
        Arc::new(sub_config),
        sub_agent_runtime,
        mode_lock,
        inner_tool_event_rx,
        context_window,
        subagent_id.clone(),
    );

    let (agent_tx, mut agent_rx) = mpsc::channel::<AgentEvent>(256);

    let worker = tokio::task::spawn_blocking(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build sub-agent worker runtime");
        rt.block_on(agent.submit(&prompt, agent_tx))
    });

    let mut output = String::new();
    let mut any_tool_error = false;
    while let Some(event) = agent_rx.recv().await {
        match event {
            AgentEvent::TextDelta(delta) => {
                if !delta.is_empty() {
                    let _ = relay_tx
                        .send(ToolEvent::SubagentProgress {
                            id: subagent_id.clone(),
                            text: delta.clone(),
                        })
                        .await;
                }
                output.push_str(&delta);
            }
            AgentEvent::ToolCallStarted(tc) => {
                let _ = relay_tx
                    .send(ToolEvent::SubagentToolStart {
                        id: subagent_id.clone(),
                        tool_name: tc.name,
                    })
                    .await;
            }
            AgentEvent::ToolCallFinished {
                tool_name,
                is_error,
                ..
            } => {
                any_tool_error = any_tool_error || is_error;
                let _ = relay_tx
                    .send(ToolEvent::SubagentToolEnd {
                        id: subagent_id.clone(),
                        tool_name,
                        is_error,
                    })
                    .await;
            }
            _ => {}
        }
    }

    let (result, is_error) = match worker.await {
        Ok(Ok(())) => {
            if output.is_empty() {
                ("(sub-agent produced no text output)".to_string(), false)
            } else {
                (output, any_tool_error)
            }
        }
        Ok(Err(e)) => (format!("sub-agent error: {e}"), true),
        Err(e) => (format!("sub-agent worker thread panicked: {e}"), true),
    };

    (result, is_error)
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Spawn a sub-agent to complete a focused task and return its final text output. \
         Useful for delegating isolated sub-tasks. The sub-agent has access to all standard \
         tools. Maximum nesting depth is 2."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The task description for the sub-agent"
                },
                "mode": {
                    "type": "string",
                    "enum": ["research", "plan", "agent"],
                    "description": "Operating mode for the sub-agent (default: agent)"
                },
                "max_rounds": {
                    "type": "integer",
                    "description": "Maximum tool-call rounds (default: from config)"
                }
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Agent]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let prompt = match call.args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'prompt'"),
        };
        let mode_str = call
            .args
            .get("mode")
            .and_then(|v| v.as_str())
            .unwrap_or("agent");
        let mode = match mode_str {
            "research" => AgentMode::Research,
            "plan" => AgentMode::Plan,
            "agent" => AgentMode::Agent,
            other => return ToolOutput::err(&call.id, format!("unknown mode: {other}")),
        };

        let current_depth = self.depth.load(Ordering::Relaxed);
        if current_depth >= MAX_DEPTH {
            return ToolOutput::err(
                &call.id,
                format!("maximum sub-agent depth ({MAX_DEPTH}) reached"),
            );
        }

        self.depth.fetch_add(1, Ordering::Relaxed);

        let subagent_id = short_id("task");
        debug!(
            prompt = %prompt,
            mode = %mode,
            depth = current_depth + 1,
            id = %subagent_id,
            "task: spawning sub-agent"
        );
        let _ = self
            .tool_event_tx
            .send(ToolEvent::SubagentStart {
                id: subagent_id.clone(),
                description: prompt.clone(),
            })
            .await;

        let mut sub_config: AgentConfig = self.config.agent.clone();
        if let Some(max_rounds) = call.args.get("max_rounds").and_then(|v| v.as_u64()) {
            sub_config.max_tool_rounds = max_rounds as u32;
        }

        let (result, is_error) = run_subagent_isolated(
            self.model.clone(),
            self.config.clone(),
            sub_config,
            self.sub_agent_runtime.clone(),
            prompt,
            mode,
            subagent_id.clone(),
            self.tool_event_tx.clone(),
        )
        .await;

        self.depth.fetch_sub(1, Ordering::Relaxed);

        let _ = self
            .tool_event_tx
            .send(ToolEvent::SubagentDone {
                id: subagent_id,
                result: result.clone(),
                is_error,
            })
            .await;

        if is_error {
            ToolOutput::err(&call.id, result)
        } else {
            ToolOutput::ok(&call.id, result)
        }
    }
}
