// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! SpawnTeamTool — runs several sub-agents concurrently on independent tasks
//! and collects their results as they finish.
//!
//! Builds out `sven-team`'s generic `TeamScheduler`/`TeamWorker` with the
//! concrete Agent wiring: each teammate is a fresh sub-agent isolated the
//! same way `task` isolates its sub-agent (dedicated worker thread), with its
//! events relayed through the shared `tool_event_tx` tagged with both a
//! `team_id` and a `member_id`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use sven_config::{AgentConfig, AgentMode, Config};
use sven_core::AgentRuntimeContext;
use sven_team::{TeamMemberResult, TeamMemberTask, TeamScheduler, TeamWorker};

use sven_tools::{
    events::ToolEvent,
    policy::ApprovalPolicy,
    tool::{Tool, ToolCall, ToolOutput},
};

use crate::task_tool::{run_subagent_isolated, short_id, MAX_DEPTH};

/// Implements `TeamWorker` by spawning one isolated sub-agent per task and
/// relaying its `Subagent*`-shaped progress as `Team*` events tagged with
/// both ids.
struct AgentTeamWorker {
    model: Arc<dyn sven_model::ModelProvider>,
    config: Arc<Config>,
    sub_config: AgentConfig,
    sub_agent_runtime: AgentRuntimeContext,
    mode: AgentMode,
    team_id: String,
    tool_event_tx: mpsc::Sender<ToolEvent>,
}

#[async_trait]
impl TeamWorker for AgentTeamWorker {
    async fn run(&self, task: TeamMemberTask) -> TeamMemberResult {
        // `run_subagent_isolated` relays `Subagent*` events; re-tag them as
        // `Team*` events via a small forwarding channel so the parent's
        // drain loop sees them attributed to this team.
        let (forward_tx, mut forward_rx) = mpsc::channel::<ToolEvent>(64);
        let team_id = self.team_id.clone();
        let member_id = task.member_id.clone();
        let outer_tx = self.tool_event_tx.clone();
        let relay = tokio::spawn(async move {
            while let Some(ev) = forward_rx.recv().await {
                let team_ev = match ev {
                    ToolEvent::SubagentProgress { text, .. } => Some(ToolEvent::TeamProgress {
                        team_id: team_id.clone(),
                        member_id: member_id.clone(),
                        text,
                    }),
                    ToolEvent::SubagentToolStart { tool_name, .. } => {
                        Some(ToolEvent::TeamProgress {
                            team_id: team_id.clone(),
                            member_id: member_id.clone(),
                            text: format!("[{tool_name}] running"),
                        })
                    }
                    _ => None,
                };
                if let Some(ev) = team_ev {
                    let _ = outer_tx.send(ev).await;
                }
            }
        });

        let (result, is_error) = run_subagent_isolated(
            self.model.clone(),
            self.config.clone(),
            self.sub_config.clone(),
            self.sub_agent_runtime.clone(),
            task.task.clone(),
            self.mode,
            format!("{}/{}", self.team_id, task.member_id),
            forward_tx,
        )
        .await;

        // `forward_tx` was consumed by `run_subagent_isolated` and is now
        // dropped, so the relay task's `recv()` loop will end on its own —
        // await it so every buffered event is forwarded before we return.
        let _ = relay.await;

        let _ = self
            .tool_event_tx
            .send(ToolEvent::TeamTask {
                team_id: self.team_id.clone(),
                member_id: task.member_id.clone(),
                task: task.task.clone(),
                is_error,
            })
            .await;

        TeamMemberResult {
            member_id: task.member_id,
            output: result,
            is_error,
        }
    }
}

/// Spawns a team of concurrent sub-agents, one per `tasks` entry, and returns
/// each member's result once all have completed.
pub struct SpawnTeamTool {
    model: Arc<dyn sven_model::ModelProvider>,
    config: Arc<Config>,
    depth: Arc<AtomicUsize>,
    sub_agent_runtime: AgentRuntimeContext,
    tool_event_tx: mpsc::Sender<ToolEvent>,
}

impl SpawnTeamTool {
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

#[async_trait]
impl Tool for SpawnTeamTool {
    fn name(&self) -> &str {
        "spawn_team"
    }

    fn description(&self) -> &str {
        "Spawn a team of concurrent sub-agents and distribute tasks across them round-robin \
         (task i goes to teammates[i % teammates.len()]). Each teammate works through its \
         assigned tasks sequentially while teammates run concurrently; one teammate failing a \
         task does not cancel the others. Use this instead of repeated `task` calls when there \
         are more independent sub-tasks than you want concurrent workers. Maximum nesting depth \
         is 2."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "teammates": {
                    "type": "array",
                    "minItems": 1,
                    "items": {"type": "string"},
                    "description": "Short labels for each concurrent worker, e.g. [\"explore\", \"plan\"]"
                },
                "tasks": {
                    "type": "array",
                    "minItems": 1,
                    "items": {"type": "string"},
                    "description": "Task descriptions, distributed round-robin across teammates"
                },
                "mode": {
                    "type": "string",
                    "enum": ["research", "plan", "agent"],
                    "description": "Operating mode shared by all teammates (default: agent)"
                }
            },
            "required": ["teammates", "tasks"],
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
        let Some(raw_teammates) = call.args.get("teammates").and_then(|v| v.as_array()) else {
            return ToolOutput::err(&call.id, "missing 'teammates' array");
        };
        if raw_teammates.is_empty() {
            return ToolOutput::err(&call.id, "'teammates' must contain at least one entry");
        }
        let Some(raw_tasks) = call.args.get("tasks").and_then(|v| v.as_array()) else {
            return ToolOutput::err(&call.id, "missing 'tasks' array");
        };
        if raw_tasks.is_empty() {
            return ToolOutput::err(&call.id, "'tasks' must contain at least one entry");
        }

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

        let mut teammates = Vec::with_capacity(raw_teammates.len());
        for (i, entry) in raw_teammates.iter().enumerate() {
            match entry.as_str() {
                Some(name) => teammates.push(name.to_string()),
                None => {
                    return ToolOutput::err(&call.id, format!("teammate {i}: not a string"));
                }
            }
        }

        let mut tasks = Vec::with_capacity(raw_tasks.len());
        for (i, entry) in raw_tasks.iter().enumerate() {
            match entry.as_str() {
                Some(t) => tasks.push(t.to_string()),
                None => return ToolOutput::err(&call.id, format!("task {i}: not a string")),
            }
        }
        let tasks_total = tasks.len();

        let team_id = short_id("team");
        self.depth.fetch_add(1, Ordering::Relaxed);
        debug!(team_id = %team_id, member_count = teammates.len(), tasks_total, "spawn_team: starting team");

        let _ = self
            .tool_event_tx
            .send(ToolEvent::TeamStart {
                team_id: team_id.clone(),
                member_count: teammates.len(),
            })
            .await;

        let worker: Arc<dyn TeamWorker> = Arc::new(AgentTeamWorker {
            model: self.model.clone(),
            config: self.config.clone(),
            sub_config: self.config.agent.clone(),
            sub_agent_runtime: self.sub_agent_runtime.clone(),
            mode,
            team_id: team_id.clone(),
            tool_event_tx: self.tool_event_tx.clone(),
        });

        let results = TeamScheduler::run_round_robin(worker, teammates, tasks).await;

        self.depth.fetch_sub(1, Ordering::Relaxed);

        let summary = results
            .iter()
            .map(|r| {
                let status = if r.is_error { "ERROR" } else { "ok" };
                format!("## {} [{status}]\n{}", r.member_id, r.output)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let tasks_completed = results.iter().filter(|r| !r.is_error).count();
        let any_error = tasks_completed != tasks_total;
        let _ = self
            .tool_event_tx
            .send(ToolEvent::TeamDone {
                team_id,
                results: results
                    .into_iter()
                    .map(|r| (r.member_id, r.output))
                    .collect(),
                tasks_completed,
                tasks_total,
                success: !any_error,
            })
            .await;

        if any_error {
            ToolOutput::err(&call.id, summary)
        } else {
            ToolOutput::ok(&call.id, summary)
        }
    }
}
