// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Retry-with-backoff for transient model-provider failures.
//!
//! Mirrors the teacher's tool-call isolation style (small, focused helpers
//! with unit-testable pure functions) rather than a generic retry crate: the
//! policy here is specific to one failure class (provider overload) and one
//! fixed schedule, so a dependency would buy nothing.

use std::time::Duration;

/// Delay before the first retry.
const BASE_DELAY_MS: u64 = 500;
/// Multiplier applied to the delay after each retry.
const BACKOFF_MULTIPLIER: u64 = 2;
/// Total attempts against a single model, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

/// Return `true` if `err` looks like a transient overload / rate-limit
/// response worth retrying, based on substrings common across provider
/// error bodies (Anthropic `overloaded_error`, HTTP 429/503, generic
/// "rate limit" / "too many requests" text used by OpenAI-compatible
/// gateways).
pub fn is_overload_error(err: &anyhow::Error) -> bool {
    let msg = format!("{err:#}").to_lowercase();
    msg.contains("overloaded")
        || msg.contains("rate limit")
        || msg.contains("rate_limit")
        || msg.contains("429")
        || msg.contains("503")
        || msg.contains("too many requests")
}

/// Exponential backoff delay for the given zero-indexed retry attempt
/// (0 = delay before the first retry): 500ms, 1000ms, 2000ms, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS * BACKOFF_MULTIPLIER.pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_doubles_each_attempt() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn detects_anthropic_overload_error() {
        let err = anyhow::anyhow!("request failed: overloaded_error: servers are overloaded");
        assert!(is_overload_error(&err));
    }

    #[test]
    fn detects_http_429_and_503() {
        assert!(is_overload_error(&anyhow::anyhow!("HTTP 429 Too Many Requests")));
        assert!(is_overload_error(&anyhow::anyhow!("upstream returned 503")));
    }

    #[test]
    fn does_not_flag_unrelated_errors() {
        let err = anyhow::anyhow!("invalid API key");
        assert!(!is_overload_error(&err));
    }
}
