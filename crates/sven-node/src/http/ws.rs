// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! WebSocket bridge — translates a browser WebSocket connection into a
//! per-connection conversation against `sven_core::Agent`.
//!
//! # Why this exists
//!
//! Web browsers cannot speak the TUI's in-process event channel. This
//! handler is a thin shim so a web control UI can drive the agent without
//! any installed software.
//!
//! # Isolation
//!
//! Each connection owns its own [`Conversation`] — its own `Agent`, its own
//! abort handle. Nothing here is broadcast to other connections; two
//! operators connected to the same node never see each other's turns.
//!
//! # Security
//!
//! Authentication happens before the WebSocket upgrade via the bearer token
//! middleware (see `auth.rs`). By the time `ws_handler` runs, the request
//! is already authenticated. The WebSocket itself adds no additional auth
//! — it inherits the HTTP connection's auth.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sven_core::{Agent, AgentEvent};

use crate::control::{
    protocol::{ControlCommand, ControlEvent, ConversationSummary, ToolInfo, UsageSummary},
    service::AgentHandle,
};

/// Tool output longer than this is truncated with a visible marker before
/// being sent in a `tool_result` event.
const TOOL_RESULT_MAX_BYTES: usize = 10 * 1024;

/// HTTP handler for GET /ws.
pub async fn ws_handler(ws: WebSocketUpgrade, State(agent): State<AgentHandle>) -> Response {
    let addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
    ws.on_upgrade(move |socket| handle_socket(socket, agent, addr))
}

/// One conversation this connection currently owns.
struct Conversation {
    id: Uuid,
    agent: Arc<Mutex<Agent>>,
}

/// Outcome of a turn that just finished, deciding which terminal event to
/// emit once the conversation's usage has been read back from the session.
enum TurnOutcome {
    Done,
    Aborted,
    Error(String),
}

/// Publicly accessible socket handler for direct use from the HTTP router.
pub async fn handle_socket(mut socket: WebSocket, agent: AgentHandle, peer: SocketAddr) {
    info!(%peer, "WebSocket client connected");

    let tools = match probe_tools(&agent).await {
        Ok(t) => t,
        Err(e) => {
            warn!(%peer, "failed to enumerate tools: {e}");
            Vec::new()
        }
    };
    send_event(
        &mut socket,
        &ControlEvent::Ready {
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools: tools.clone(),
        },
    )
    .await;

    let mut conversation: Option<Conversation> = None;
    let mut turn_abort: Option<oneshot::Sender<()>> = None;
    let mut output_tokens: u32 = 0;
    let (agent_event_tx, mut agent_event_rx) = mpsc::channel::<AgentEvent>(512);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ControlCommand>(&text) {
                            Ok(cmd) => {
                                handle_command(
                                    cmd,
                                    &agent,
                                    &mut socket,
                                    &mut conversation,
                                    &mut turn_abort,
                                    &agent_event_tx,
                                    &tools,
                                    peer,
                                )
                                .await;
                            }
                            Err(e) => {
                                warn!(%peer, "invalid command JSON: {e}");
                                send_event(
                                    &mut socket,
                                    &ControlEvent::Error {
                                        message: format!("invalid JSON command: {e}"),
                                    },
                                )
                                .await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames ignored
                    Some(Err(e)) => {
                        debug!(%peer, "WebSocket recv error: {e}");
                        break;
                    }
                }
            }
            Some(ev) = agent_event_rx.recv() => {
                let (ctrl_ev, outcome) = agent_event_to_control(ev, &mut output_tokens);
                if let Some(ev) = ctrl_ev {
                    send_event(&mut socket, &ev).await;
                }
                if let Some(outcome) = outcome {
                    turn_abort = None;
                    if let Some(conv) = &conversation {
                        let (messages, cost_usd, token_count) = {
                            let a = conv.agent.lock().await;
                            (a.session().messages.clone(), a.session().cost_usd, a.session().token_count)
                        };
                        persist_conversation(conv.id, &messages, peer).await;
                        match outcome {
                            TurnOutcome::Done => {
                                let usage = UsageSummary {
                                    input_tokens: token_count,
                                    output_tokens: output_tokens as usize,
                                    cost_usd,
                                };
                                send_event(&mut socket, &ControlEvent::Done { usage, conversation_id: conv.id }).await;
                            }
                            TurnOutcome::Aborted => {
                                send_event(&mut socket, &ControlEvent::Aborted).await;
                            }
                            TurnOutcome::Error(message) => {
                                send_event(&mut socket, &ControlEvent::Error { message }).await;
                            }
                        }
                    }
                    output_tokens = 0;
                }
            }
        }
    }

    info!(%peer, "WebSocket client disconnected");
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    cmd: ControlCommand,
    agent: &AgentHandle,
    socket: &mut WebSocket,
    conversation: &mut Option<Conversation>,
    turn_abort: &mut Option<oneshot::Sender<()>>,
    agent_event_tx: &mpsc::Sender<AgentEvent>,
    tools: &[ToolInfo],
    peer: SocketAddr,
) {
    match cmd {
        ControlCommand::Ping => {
            send_event(socket, &ControlEvent::Pong).await;
        }

        ControlCommand::GetTools => {
            send_event(socket, &ControlEvent::Tools { tools: tools.to_vec() }).await;
        }

        ControlCommand::Abort => {
            if let Some(tx) = turn_abort.take() {
                info!(%peer, "turn aborted by client");
                let _ = tx.send(());
            }
        }

        ControlCommand::GetConversations => match sven_input::history::list(None) {
            Ok(entries) => {
                let conversations = entries
                    .into_iter()
                    .map(|e| ConversationSummary {
                        id: e.id,
                        title: e.title,
                        message_count: e.message_count,
                        updated_at: e.timestamp,
                    })
                    .collect();
                send_event(socket, &ControlEvent::Conversations { conversations }).await;
            }
            Err(e) => {
                send_event(socket, &ControlEvent::Error { message: format!("{e}") }).await;
            }
        },

        ControlCommand::NewConversation => {
            let id = Uuid::new_v4();
            match agent.build_agent(&id.to_string()).await {
                Ok(built) => {
                    *conversation = Some(Conversation { id, agent: Arc::new(Mutex::new(built)) });
                    send_event(socket, &ControlEvent::ConversationCreated { conversation_id: id }).await;
                }
                Err(e) => {
                    send_event(
                        socket,
                        &ControlEvent::Error { message: format!("failed to create conversation: {e}") },
                    )
                    .await;
                }
            }
        }

        ControlCommand::LoadConversation { conversation_id } => {
            match sven_input::history::load(&conversation_id.to_string()) {
                Ok((parsed, _path)) => match agent.build_agent(&conversation_id.to_string()).await {
                    Ok(mut built) => {
                        let messages = parsed.history.clone();
                        built.seed_history(parsed.history).await;
                        *conversation = Some(Conversation {
                            id: conversation_id,
                            agent: Arc::new(Mutex::new(built)),
                        });
                        send_event(
                            socket,
                            &ControlEvent::ConversationLoaded { conversation_id, messages },
                        )
                        .await;
                    }
                    Err(e) => {
                        send_event(socket, &ControlEvent::Error { message: format!("{e}") }).await;
                    }
                },
                Err(e) => {
                    send_event(
                        socket,
                        &ControlEvent::Error {
                            message: format!("conversation {conversation_id} not found: {e}"),
                        },
                    )
                    .await;
                }
            }
        }

        ControlCommand::Query { prompt, conversation_id, .. } => {
            if turn_abort.is_some() {
                send_event(
                    socket,
                    &ControlEvent::Error {
                        message: "a turn is already running on this connection".to_string(),
                    },
                )
                .await;
                return;
            }

            let Some(id) =
                ensure_conversation_for_query(agent, conversation, conversation_id, socket).await
            else {
                return;
            };

            info!(%peer, conversation = %id, "query received");
            send_event(
                socket,
                &ControlEvent::Started { model: agent.model_name(), conversation_id: id },
            )
            .await;

            let conv_agent = conversation.as_ref().unwrap().agent.clone();
            let tx = agent_event_tx.clone();
            let (cancel_tx, cancel_rx) = oneshot::channel();
            *turn_abort = Some(cancel_tx);
            tokio::spawn(async move {
                let mut a = conv_agent.lock().await;
                let _ = a.submit_with_cancel(&prompt, tx, cancel_rx).await;
            });
        }
    }
}

/// Resolves which conversation a `query` runs against, building or loading
/// one as needed and announcing `conversation_created` when a fresh id was
/// minted. Returns `None` (after sending `error`) on a hard failure.
async fn ensure_conversation_for_query(
    agent: &AgentHandle,
    conversation: &mut Option<Conversation>,
    conversation_id: Option<Uuid>,
    socket: &mut WebSocket,
) -> Option<Uuid> {
    if let Some(want_id) = conversation_id {
        if let Some(conv) = conversation.as_ref() {
            if conv.id == want_id {
                return Some(want_id);
            }
        }
        return match build_conversation(agent, want_id).await {
            Ok(conv) => {
                *conversation = Some(conv);
                Some(want_id)
            }
            Err(e) => {
                send_event(
                    socket,
                    &ControlEvent::Error {
                        message: format!("failed to resume conversation {want_id}: {e}"),
                    },
                )
                .await;
                None
            }
        };
    }

    if let Some(conv) = conversation.as_ref() {
        return Some(conv.id);
    }

    let id = Uuid::new_v4();
    match agent.build_agent(&id.to_string()).await {
        Ok(built) => {
            *conversation = Some(Conversation { id, agent: Arc::new(Mutex::new(built)) });
            send_event(socket, &ControlEvent::ConversationCreated { conversation_id: id }).await;
            Some(id)
        }
        Err(e) => {
            send_event(socket, &ControlEvent::Error { message: format!("failed to create conversation: {e}") })
                .await;
            None
        }
    }
}

/// Builds an `Agent` scoped to `id`, seeding it from the on-disk session
/// record if one exists. A missing record is not an error — `query` with an
/// unrecognised `conversationId` just starts that id fresh.
async fn build_conversation(agent: &AgentHandle, id: Uuid) -> anyhow::Result<Conversation> {
    let mut built = agent.build_agent(&id.to_string()).await?;
    if let Ok((parsed, _path)) = sven_input::history::load(&id.to_string()) {
        built.seed_history(parsed.history).await;
    }
    Ok(Conversation { id, agent: Arc::new(Mutex::new(built)) })
}

/// Builds a throwaway `Agent` purely to read back its tool schemas — tool
/// availability doesn't depend on conversation identity.
async fn probe_tools(agent: &AgentHandle) -> anyhow::Result<Vec<ToolInfo>> {
    let probe_id = Uuid::new_v4().to_string();
    let built = agent.build_agent(&probe_id).await?;
    Ok(built
        .tools()
        .schemas()
        .into_iter()
        .map(|s| ToolInfo { name: s.name, description: s.description })
        .collect())
}

async fn persist_conversation(id: Uuid, messages: &[sven_model::Message], peer: SocketAddr) {
    if messages.is_empty() {
        return;
    }
    if let Err(e) = sven_input::history::ensure_history_dir() {
        warn!(%peer, "failed to create history directory: {e}");
        return;
    }
    let path = sven_input::history::history_dir().join(format!("{id}.json"));
    if let Err(e) = sven_input::history::save_to(&path, messages) {
        warn!(%peer, session = %id, "failed to persist conversation: {e}");
    }
}

/// Translates one `AgentEvent` into the wire event to forward (if any) and,
/// when the event ends the turn, which terminal outcome to report once the
/// conversation's usage has been read back.
fn agent_event_to_control(
    ev: AgentEvent,
    output_tokens: &mut u32,
) -> (Option<ControlEvent>, Option<TurnOutcome>) {
    match ev {
        AgentEvent::TextDelta(delta) => {
            (Some(ControlEvent::Text { delta, role: "assistant".to_string() }), None)
        }
        AgentEvent::TextComplete(_) => (None, None),
        AgentEvent::ThinkingDelta(delta) => {
            (Some(ControlEvent::Text { delta, role: "thinking".to_string() }), None)
        }
        AgentEvent::ThinkingComplete(_) => (None, None),
        AgentEvent::ToolCallStarted(call) => (
            Some(ControlEvent::ToolStart { call_id: call.id, tool_name: call.name, args: call.args }),
            None,
        ),
        AgentEvent::ToolCallFinished { call_id, output, is_error, .. } => (
            Some(ControlEvent::ToolResult { call_id, output: truncate_tool_output(output), is_error }),
            None,
        ),
        AgentEvent::TokenUsage { output, .. } => {
            *output_tokens += output;
            (None, None)
        }
        AgentEvent::TurnComplete => (None, Some(TurnOutcome::Done)),
        AgentEvent::Aborted { .. } => (None, Some(TurnOutcome::Aborted)),
        AgentEvent::Error(message) => (None, Some(TurnOutcome::Error(message))),
        AgentEvent::BudgetExceeded { spent_usd, limit_usd } => (
            None,
            Some(TurnOutcome::Error(format!(
                "budget exceeded: ${spent_usd:.4} spent, limit ${limit_usd:.4}"
            ))),
        ),
        AgentEvent::TurnLimitReached { turns, limit } => {
            (None, Some(TurnOutcome::Error(format!("turn limit reached: {turns}/{limit}"))))
        }
        AgentEvent::Bailed { reason } => {
            (None, Some(TurnOutcome::Error(format!("loop detector bailed: {reason}"))))
        }
        AgentEvent::ContextCompacted { before_count, after_count, tokens_saved, .. } => (
            Some(ControlEvent::Debug {
                message: format!(
                    "context compacted: {before_count} -> {after_count} messages, {tokens_saved} tokens saved"
                ),
            }),
            None,
        ),
        AgentEvent::TodoUpdate(todos) => (
            Some(ControlEvent::Debug { message: format!("todo list updated ({} items)", todos.len()) }),
            None,
        ),
        AgentEvent::ModeChanged(mode) => {
            (Some(ControlEvent::Debug { message: format!("mode changed to {mode:?}") }), None)
        }
        AgentEvent::Question { id, questions } => (
            Some(ControlEvent::Debug { message: format!("question {id}: {}", questions.join(" | ")) }),
            None,
        ),
        AgentEvent::QuestionAnswer { id, answer } => (
            Some(ControlEvent::Debug { message: format!("question {id} answered: {answer}") }),
            None,
        ),
        AgentEvent::SubagentStart { id, description } => (
            Some(ControlEvent::Debug { message: format!("subagent {id} started: {description}") }),
            None,
        ),
        AgentEvent::SubagentProgress { id, text } => {
            (Some(ControlEvent::Debug { message: format!("subagent {id}: {text}") }), None)
        }
        AgentEvent::SubagentToolStart { id, tool_name } => (
            Some(ControlEvent::Debug { message: format!("subagent {id} tool_start {tool_name}") }),
            None,
        ),
        AgentEvent::SubagentToolEnd { id, tool_name, is_error } => (
            Some(ControlEvent::Debug {
                message: format!("subagent {id} tool_end {tool_name} error={is_error}"),
            }),
            None,
        ),
        AgentEvent::SubagentDone { id, result, is_error } => (
            Some(ControlEvent::Debug { message: format!("subagent {id} done error={is_error}: {result}") }),
            None,
        ),
        AgentEvent::TeamStart { team_id, member_count } => (
            Some(ControlEvent::Debug {
                message: format!("team {team_id} started with {member_count} members"),
            }),
            None,
        ),
        AgentEvent::TeamProgress { team_id, member_id, text } => (
            Some(ControlEvent::Debug { message: format!("team {team_id}/{member_id}: {text}") }),
            None,
        ),
        AgentEvent::TeamTask { team_id, member_id, task, is_error } => (
            Some(ControlEvent::Debug {
                message: format!("team {team_id}/{member_id} task '{task}' error={is_error}"),
            }),
            None,
        ),
        AgentEvent::TeamDone { team_id, tasks_completed, tasks_total, success, .. } => (
            Some(ControlEvent::Debug {
                message: format!("team {team_id} done {tasks_completed}/{tasks_total} success={success}"),
            }),
            None,
        ),
    }
}

/// Truncates `output` to at most [`TOOL_RESULT_MAX_BYTES`], on a char
/// boundary, appending a visible marker when truncation occurred.
fn truncate_tool_output(output: String) -> String {
    if output.len() <= TOOL_RESULT_MAX_BYTES {
        return output;
    }
    let mut end = TOOL_RESULT_MAX_BYTES;
    while end > 0 && !output.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = output[..end].to_string();
    truncated.push_str("\n... [truncated, output exceeds 10 KiB]");
    truncated
}

async fn send_event(socket: &mut WebSocket, ev: &ControlEvent) {
    if let Ok(json) = serde_json::to_string(ev) {
        let _ = socket.send(Message::Text(json)).await;
    }
}
