// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Detects when the agent is stuck repeating the same tool call or burning
//! through failures without making progress, and signals the turn loop to
//! bail out instead of spinning forever.
//!
//! This has no teacher counterpart — the teacher's loop runs to its
//! `max_tool_rounds` cap and relies on the nudge-then-stop heuristics already
//! in `agent.rs`. Those catch "text-only stall" but not "identical tool call
//! over and over" or "every call this turn is failing". This module closes
//! that gap with a small, deterministic state machine the turn loop consults
//! before and after each tool call.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use serde_json::Value;

/// How many times the exact same (tool, args) pair may be called within the
/// trailing window before it's blocked outright.
const IDENTICAL_CALL_LIMIT: usize = 4;
/// Number of most recent calls (across the whole session) considered when
/// counting repeats of a given call.
const IDENTICAL_CALL_WINDOW: usize = 20;
/// Consecutive tool errors (regardless of which tool) before bailing.
const CONSECUTIVE_ERROR_LIMIT: usize = 3;
/// Total tool errors within a single turn before bailing.
const TURN_ERROR_LIMIT: usize = 5;
/// Total tool errors across the whole session before bailing.
const SESSION_TOOL_ERROR_LIMIT: usize = 10;
/// Consecutive turns that ended with zero progress (every tool call in the
/// turn failed) before bailing.
const CONSECUTIVE_FAILED_TURN_LIMIT: usize = 3;
/// Cap on the permanent failed-strategy blocklist; trimmed FIFO to half this
/// size once exceeded so memory doesn't grow unbounded in long sessions.
const FAILED_STRATEGIES_CAP: usize = 200;
const FAILED_STRATEGIES_TRIM_TO: usize = 100;

/// What the turn loop should do with a proposed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopDecision {
    /// Proceed with the call normally.
    Allow,
    /// Don't execute the call; synthesize an error tool-result explaining
    /// why, so the model sees the block as conversational feedback.
    Block { reason: String },
    /// Abandon the turn loop entirely; emit `AgentEvent::Bailed`.
    Bail { reason: String },
}

/// Canonicalize a tool call's (name, args) into a stable hash so that
/// argument key order doesn't defeat repeat detection.
fn call_hash(tool_name: &str, args: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    tool_name.hash(&mut hasher);
    canonical_json(args).hash(&mut hasher);
    hasher.finish()
}

/// Serialize a `Value` with object keys sorted, so `{"a":1,"b":2}` and
/// `{"b":2,"a":1}` hash identically.
fn canonical_json(v: &Value) -> String {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut s = String::from("{");
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    s.push(',');
                }
                s.push_str(&format!("{:?}:{}", k, canonical_json(&map[*k])));
            }
            s.push('}');
            s
        }
        Value::Array(items) => {
            let mut s = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    s.push(',');
                }
                s.push_str(&canonical_json(item));
            }
            s.push(']');
            s
        }
        other => other.to_string(),
    }
}

/// Tracks repeated calls, error streaks, and failed-turn streaks across a
/// session and decides when the agent is stuck.
pub struct LoopDetector {
    /// Hashes of the last `IDENTICAL_CALL_WINDOW` tool calls made this
    /// session, oldest first.
    recent_calls: VecDeque<u64>,
    /// Count of each hash currently present in `recent_calls`.
    call_counts: HashMap<u64, usize>,
    /// Consecutive errors observed for a given tool (reset on that tool's
    /// next success). Keyed by tool name per the Data Model's
    /// `map name→consecutiveErrors`.
    consecutive_errors: HashMap<String, usize>,
    /// Tool errors observed so far in the current turn, aggregated across
    /// all tools (reset by `reset_turn`).
    turn_errors: usize,
    /// Tool errors observed across the whole session for a given tool.
    /// Keyed by tool name per the Data Model's `map name→sessionErrors`.
    session_errors: HashMap<String, usize>,
    /// Whether any tool call has succeeded so far in the current turn.
    turn_had_success: bool,
    /// Whether any tool call has been made at all in the current turn.
    turn_had_call: bool,
    /// Consecutive turns (that contained at least one tool call) where every
    /// call failed.
    consecutive_failed_turns: usize,
    /// Call hashes permanently blocked for the rest of the session because
    /// they already triggered a block once (FIFO-capped).
    failed_strategies: VecDeque<u64>,
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopDetector {
    pub fn new() -> Self {
        Self {
            recent_calls: VecDeque::with_capacity(IDENTICAL_CALL_WINDOW),
            call_counts: HashMap::new(),
            consecutive_errors: HashMap::new(),
            turn_errors: 0,
            session_errors: HashMap::new(),
            turn_had_success: false,
            turn_had_call: false,
            consecutive_failed_turns: 0,
            failed_strategies: VecDeque::new(),
        }
    }

    /// Reset all session-level state (used when a session is replaced, e.g.
    /// `/clear`).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Reset only the per-turn counters. Called at the start of each new
    /// model turn.
    pub fn reset_turn(&mut self) {
        self.turn_errors = 0;
        self.turn_had_success = false;
        self.turn_had_call = false;
    }

    /// Consult the detector before executing `tool_name` with `args`. Must be
    /// called once per proposed call, before `record_result`.
    pub fn record_call(&mut self, tool_name: &str, args: &Value) -> LoopDecision {
        let hash = call_hash(tool_name, args);

        if self.failed_strategies.contains(&hash) {
            return LoopDecision::Block {
                reason: format!(
                    "`{tool_name}` with these exact arguments already failed and was \
                     blocked earlier this session. Try a different approach instead of \
                     repeating it."
                ),
            };
        }

        let count = self.call_counts.get(&hash).copied().unwrap_or(0);
        if count + 1 >= IDENTICAL_CALL_LIMIT {
            self.block_strategy(hash);
            return LoopDecision::Block {
                reason: format!(
                    "`{tool_name}` has been called with identical arguments {} times in a row. \
                     Stop repeating it and try a different approach.",
                    count + 1
                ),
            };
        }

        // Error-streak thresholds block the *next* attempt rather than the
        // one that tripped them — recordResult only updates counters, so a
        // call is never retroactively un-executed. This keeps the decision
        // for a batch of parallel calls deterministic: it depends only on
        // state already settled before this batch started.
        let consecutive = self
            .consecutive_errors
            .get(tool_name)
            .copied()
            .unwrap_or(0);
        if consecutive >= CONSECUTIVE_ERROR_LIMIT {
            return LoopDecision::Block {
                reason: format!(
                    "`{tool_name}` has failed {consecutive} times in a row. Try a different \
                     approach instead of repeating it."
                ),
            };
        }
        if self.turn_errors >= TURN_ERROR_LIMIT {
            return LoopDecision::Block {
                reason: format!(
                    "{} tool calls have failed within this turn. Stop and reconsider before \
                     trying more tools.",
                    self.turn_errors
                ),
            };
        }
        let session_failures = self.session_errors.get(tool_name).copied().unwrap_or(0);
        if session_failures >= SESSION_TOOL_ERROR_LIMIT {
            return LoopDecision::Block {
                reason: format!(
                    "`{tool_name}` has failed {session_failures} times across this session. \
                     Stop using this tool."
                ),
            };
        }

        self.push_recent(hash);
        self.turn_had_call = true;
        LoopDecision::Allow
    }

    /// Consult the detector after a tool call completes. Must be called once
    /// per executed call, after `record_call` returned `Allow`. Never bails —
    /// `CONSECUTIVE_ERROR_LIMIT`/`TURN_ERROR_LIMIT`/`SESSION_TOOL_ERROR_LIMIT`
    /// are recoverable: they surface as a `Block` on the *next* `record_call`
    /// for the offending tool(s), feeding the model corrective tool_result
    /// text instead of terminating the session. Only
    /// `CONSECUTIVE_FAILED_TURN_LIMIT` (via `end_turn`) bails.
    pub fn record_result(&mut self, tool_name: &str, is_error: bool) {
        if is_error {
            *self
                .consecutive_errors
                .entry(tool_name.to_string())
                .or_insert(0) += 1;
            self.turn_errors += 1;
            *self
                .session_errors
                .entry(tool_name.to_string())
                .or_insert(0) += 1;
        } else {
            self.consecutive_errors.insert(tool_name.to_string(), 0);
            self.turn_had_success = true;
        }
    }

    /// Called once all tool results for a turn have been pushed into the
    /// session. Updates the failed-turn streak and returns `Bail` if the
    /// streak limit is hit.
    pub fn end_turn(&mut self) -> LoopDecision {
        if self.turn_had_call {
            if !self.turn_had_success {
                self.consecutive_failed_turns += 1;
                if self.consecutive_failed_turns >= CONSECUTIVE_FAILED_TURN_LIMIT {
                    return LoopDecision::Bail {
                        reason: format!(
                            "{} consecutive turns made no progress (every tool call \
                             failed). Stopping.",
                            self.consecutive_failed_turns
                        ),
                    };
                }
            } else {
                self.consecutive_failed_turns = 0;
            }
        }
        LoopDecision::Allow
    }

    fn push_recent(&mut self, hash: u64) {
        self.recent_calls.push_back(hash);
        *self.call_counts.entry(hash).or_insert(0) += 1;
        while self.recent_calls.len() > IDENTICAL_CALL_WINDOW {
            if let Some(old) = self.recent_calls.pop_front() {
                if let Some(c) = self.call_counts.get_mut(&old) {
                    *c -= 1;
                    if *c == 0 {
                        self.call_counts.remove(&old);
                    }
                }
            }
        }
    }

    fn block_strategy(&mut self, hash: u64) {
        if !self.failed_strategies.contains(&hash) {
            self.failed_strategies.push_back(hash);
        }
        if self.failed_strategies.len() > FAILED_STRATEGIES_CAP {
            while self.failed_strategies.len() > FAILED_STRATEGIES_TRIM_TO {
                self.failed_strategies.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_calls_are_blocked_after_limit() {
        let mut d = LoopDetector::new();
        let args = json!({"path": "a.txt"});
        // First IDENTICAL_CALL_LIMIT - 1 calls execute normally.
        for _ in 0..IDENTICAL_CALL_LIMIT - 1 {
            assert_eq!(d.record_call("read_file", &args), LoopDecision::Allow);
            d.record_result("read_file", false);
        }
        // The IDENTICAL_CALL_LIMIT-th call is blocked before it runs.
        match d.record_call("read_file", &args) {
            LoopDecision::Block { .. } => {}
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn key_order_does_not_defeat_dedup() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(call_hash("t", &a), call_hash("t", &b));
    }

    #[test]
    fn blocked_strategy_stays_blocked() {
        let mut d = LoopDetector::new();
        let args = json!({"cmd": "x"});
        for _ in 0..IDENTICAL_CALL_LIMIT - 1 {
            d.record_call("shell", &args);
            d.record_result("shell", false);
        }
        // This call trips the limit and adds it to failed_strategies.
        match d.record_call("shell", &args) {
            LoopDecision::Block { .. } => {}
            other => panic!("expected Block, got {other:?}"),
        }
        // A later call, even after the sliding window would've forgotten it,
        // must still be blocked.
        match d.record_call("shell", &args) {
            LoopDecision::Block { .. } => {}
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn consecutive_errors_block_the_next_call_not_bail() {
        let mut d = LoopDetector::new();
        for i in 0..CONSECUTIVE_ERROR_LIMIT {
            assert_eq!(
                d.record_call("flaky", &json!({"n": i})),
                LoopDecision::Allow
            );
            d.record_result("flaky", true);
        }
        // The streak has now hit the limit; the *next* attempt is blocked,
        // not bailed — the session keeps running.
        match d.record_call("flaky", &json!({"n": 999})) {
            LoopDecision::Block { .. } => {}
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn error_streaks_are_isolated_per_tool() {
        let mut d = LoopDetector::new();
        for i in 0..CONSECUTIVE_ERROR_LIMIT {
            d.record_call("a", &json!({"n": i}));
            d.record_result("a", true);
        }
        // `a` is now blocked, but a fresh tool `b` is unaffected.
        assert_eq!(
            d.record_call("b", &json!({"n": 0})),
            LoopDecision::Allow
        );
    }

    #[test]
    fn turn_error_limit_blocks_further_calls_this_turn() {
        let mut d = LoopDetector::new();
        d.reset_turn();
        for i in 0..TURN_ERROR_LIMIT {
            // Use a distinct tool each time so only the aggregate turn-error
            // threshold trips, not the per-tool consecutive-error one.
            let tool = format!("t{i}");
            assert_eq!(d.record_call(&tool, &json!({})), LoopDecision::Allow);
            d.record_result(&tool, true);
        }
        match d.record_call("t_next", &json!({})) {
            LoopDecision::Block { .. } => {}
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn session_tool_error_limit_blocks_that_tool_across_turns() {
        let mut d = LoopDetector::new();
        for i in 0..SESSION_TOOL_ERROR_LIMIT {
            d.reset_turn();
            d.record_call("flaky", &json!({"n": i}));
            d.record_result("flaky", true);
            // Avoid tripping the (lower) consecutive-error limit so this test
            // isolates the session-wide counter.
            d.consecutive_errors.insert("flaky".to_string(), 0);
        }
        match d.record_call("flaky", &json!({"n": 999})) {
            LoopDecision::Block { .. } => {}
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn success_resets_consecutive_error_streak() {
        let mut d = LoopDetector::new();
        d.record_call("a", &json!({"n": 1}));
        d.record_result("a", true);
        d.record_call("a", &json!({"n": 2}));
        d.record_result("a", false);
        assert_eq!(d.consecutive_errors.get("a").copied().unwrap_or(0), 0);
    }

    #[test]
    fn failed_turn_streak_triggers_bail() {
        let mut d = LoopDetector::new();
        for i in 0..CONSECUTIVE_FAILED_TURN_LIMIT - 1 {
            d.reset_turn();
            d.record_call("a", &json!({"n": i}));
            d.record_result("a", true);
            d.consecutive_errors.insert("a".to_string(), 0); // isolate the failed-turn path from the error-streak path
            assert_eq!(d.end_turn(), LoopDecision::Allow);
        }
        d.reset_turn();
        d.record_call("a", &json!({"n": 99}));
        d.record_result("a", true);
        d.consecutive_errors.insert("a".to_string(), 0);
        match d.end_turn() {
            LoopDecision::Bail { .. } => {}
            other => panic!("expected Bail, got {other:?}"),
        }
    }

    #[test]
    fn turn_with_a_success_resets_failed_turn_streak() {
        let mut d = LoopDetector::new();
        d.reset_turn();
        d.record_call("a", &json!({"n": 1}));
        d.record_result("a", true);
        d.consecutive_errors.insert("a".to_string(), 0);
        d.end_turn();
        assert_eq!(d.consecutive_failed_turns, 1);

        d.reset_turn();
        d.record_call("b", &json!({"n": 2}));
        d.record_result("b", false);
        d.end_turn();
        assert_eq!(d.consecutive_failed_turns, 0);
    }

    #[test]
    fn turn_with_no_calls_does_not_count_as_failed() {
        let mut d = LoopDetector::new();
        d.reset_turn();
        assert_eq!(d.end_turn(), LoopDecision::Allow);
        assert_eq!(d.consecutive_failed_turns, 0);
    }
}
