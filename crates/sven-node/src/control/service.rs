// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `AgentHandle` — the factory shared across serve-mode websocket
//! connections.
//!
//! # Design
//!
//! Serve mode gives every connection its own conversation state (history,
//! token totals, abort handle) — per §4.10, sessions are not shared across
//! operators the way the teacher's single `ControlService`-owned `Agent`
//! was. So there is no background actor here: `AgentHandle` only carries the
//! immutable pieces (model, config) needed to build a fresh [`Agent`] per
//! conversation, and [`http::ws::handle_socket`](crate::http::ws) owns the
//! mutable per-connection state directly.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use sven_node::control::service::AgentHandle;
//! # use std::sync::Arc;
//! # async fn example(config: Arc<sven_config::Config>, model: Arc<dyn sven_model::ModelProvider>) {
//! let handle = AgentHandle::new(config, model);
//! let agent = handle.build_agent("conversation-id").await.unwrap();
//! # let _ = agent;
//! # }
//! ```

use std::sync::Arc;

use sven_config::Config;
use sven_core::Agent;

use crate::agent_builder::build_gateway_agent;

/// Cheap-to-clone handle distributed to every websocket connection.
///
/// Holds only the shared, immutable pieces of gateway state (model + config)
/// needed to build a fresh [`Agent`] per conversation.
#[derive(Clone)]
pub struct AgentHandle {
    config: Arc<Config>,
    model: Arc<dyn sven_model::ModelProvider>,
}

impl AgentHandle {
    pub fn new(config: Arc<Config>, model: Arc<dyn sven_model::ModelProvider>) -> Self {
        Self { config, model }
    }

    /// Build a fresh, fully-wired `Agent` scoped to `session_id`.
    ///
    /// `session_id` also keys the tool registry's file-backup ring, so a
    /// conversation's pre-edit backups live under
    /// `file-history/{session_id}/`.
    pub async fn build_agent(&self, session_id: &str) -> anyhow::Result<Agent> {
        build_gateway_agent(&self.config, self.model.clone(), session_id).await
    }

    /// The model's display name, used for the `started{model, ...}` event.
    pub fn model_name(&self) -> String {
        self.model.name().to_string()
    }
}
