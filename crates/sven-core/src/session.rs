// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sven_model::Message;
use uuid::Uuid;

/// One saved turn in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: String,
}

/// Lower/upper clamp applied to the self-correcting token-count calibration
/// factor so a single bad estimate (e.g. an empty first turn) can't send it
/// to zero or to infinity.
const CALIBRATION_MIN: f32 = 0.5;
const CALIBRATION_MAX: f32 = 3.0;

/// In-memory conversation session.
///
/// Tracks both the conversation history and the token/cost accounting the
/// turn loop needs to decide when to compact and when to stop: the model's
/// context window (`max_tokens`), the reserve held back for its response
/// (`max_output_tokens`), the estimated overhead of tool schemas and dynamic
/// context that never appear in `messages` (`schema_overhead`), and a
/// self-correcting `calibration_factor` that narrows the gap between our
/// chars/4 token estimate and the provider's actual reported usage.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    /// Approximate total token count for the current message list.
    pub token_count: usize,
    /// Maximum context tokens (set from model config / provider limits).
    pub max_tokens: usize,
    /// Tokens reserved for the model's response; set from the provider's
    /// catalog entry and subtracted out of the input budget.
    pub max_output_tokens: usize,
    /// Estimated tokens consumed by tool schemas and the dynamic context
    /// suffix, neither of which live in `messages` but are sent on every
    /// request. Recomputed once per round by the turn loop.
    pub schema_overhead: usize,
    /// Running correction factor applied to the chars/4 token estimate,
    /// updated from the provider's actual reported `input_tokens` each turn.
    pub calibration_factor: f32,
    /// Cumulative prompt-cache tokens read across the session.
    pub cache_read_total: u32,
    /// Cumulative prompt-cache tokens written across the session.
    pub cache_write_total: u32,
    /// Number of completed turns (one LLM request/response cycle).
    pub turn_count: u32,
    /// Running cost in USD, accumulated from usage events.
    pub cost_usd: f64,
}

impl Session {
    pub fn new(max_tokens: usize) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), max_tokens)
    }

    /// Create a session with a caller-supplied id instead of a freshly
    /// generated uuid — used when the id must be shared with code built
    /// before the `Agent` (e.g. a tool registry's file-backup ring).
    pub fn with_id(id: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            token_count: 0,
            max_tokens,
            max_output_tokens: 0,
            schema_overhead: 0,
            calibration_factor: 1.0,
            cache_read_total: 0,
            cache_write_total: 0,
            turn_count: 0,
            cost_usd: 0.0,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs {
            self.push(m);
        }
    }

    /// Fraction of context window consumed (0.0–1.0)
    pub fn context_fraction(&self) -> f32 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        (self.token_count as f32) / (self.max_tokens as f32)
    }

    pub fn is_near_limit(&self, threshold: f32) -> bool {
        self.context_fraction() >= threshold
    }

    /// Recalculate token count from scratch (call after compaction).
    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(|m| m.approx_tokens()).sum();
    }

    /// Replace the message list and recalculate token count (for resubmit / edit).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }

    /// Tokens actually available for conversation input: the context window
    /// minus the reserve held for the model's response and the overhead of
    /// tool schemas / dynamic context sent with every request but not stored
    /// in `messages`. Zero means the model's limits are not yet known (e.g.
    /// before the first `Usage` event), in which case budget checks are a
    /// no-op.
    pub fn input_budget(&self) -> usize {
        self.max_tokens
            .saturating_sub(self.max_output_tokens)
            .saturating_sub(self.schema_overhead)
    }

    /// Fold a newly observed (actual_input_tokens, estimated_tokens) pair
    /// into the running calibration factor via an exponential moving
    /// average, clamped so one outlier turn can't destabilize later
    /// estimates.
    pub fn update_calibration(&mut self, actual_input: u32, estimated: usize) {
        if estimated == 0 {
            return;
        }
        let observed = actual_input as f32 / estimated as f32;
        let blended = self.calibration_factor * 0.7 + observed * 0.3;
        self.calibration_factor = blended.clamp(CALIBRATION_MIN, CALIBRATION_MAX);
    }

    /// Accumulate prompt-cache usage reported with a turn's `Usage` event.
    pub fn add_cache_usage(&mut self, cache_read: u32, cache_write: u32) {
        self.cache_read_total += cache_read;
        self.cache_write_total += cache_write;
    }

    /// Record a completed turn's usage against the running cost/turn
    /// counters. `cost_usd` is the caller-computed cost for this turn alone
    /// (e.g. via the model catalog's per-token pricing); it is added to the
    /// running total.
    pub fn record_turn(&mut self, turn_cost_usd: f64) {
        self.turn_count += 1;
        self.cost_usd += turn_cost_usd;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
