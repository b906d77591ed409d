// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Pre/post-tool hook contract.
//!
//! Hooks are user-configured shell commands run around tool dispatch. A
//! pre-hook may veto the call (exit code 77, or the literal marker
//! `[blocked]` anywhere in its combined stdout+stderr); a post-hook is
//! informational only and cannot affect control flow. Grounded on
//! [`crate::builtin::shell::ShellTool`]'s subprocess-isolation idiom: stdin
//! is nulled, the child is killed on drop, and the call has a hard timeout.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::tool::ToolCall;

/// Wall-clock budget for a single hook invocation.
const HOOK_TIMEOUT_SECS: u64 = 10;

/// Marker a hook can print to veto the call without controlling its own exit
/// code (handy for hooks written as one-liners piped through other tools).
const BLOCK_MARKER: &str = "[blocked]";

/// Exit code convention for hook vetoes.
const BLOCK_EXIT_CODE: i32 = 77;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookEvent {
    PreToolUse,
    PostToolUse,
}

impl HookEvent {
    fn as_str(self) -> &'static str {
        match self {
            HookEvent::PreToolUse => "pre_tool_use",
            HookEvent::PostToolUse => "post_tool_use",
        }
    }
}

/// Runs the user-configured pre/post-tool hook commands.
///
/// Holds no mutable state once built, so it is cheap to clone and share
/// across the spawned tasks that execute tool calls in parallel.
#[derive(Debug, Clone, Default)]
pub struct HookRunner {
    pre: Vec<String>,
    post: Vec<String>,
}

impl HookRunner {
    pub fn new(pre: Vec<String>, post: Vec<String>) -> Self {
        Self { pre, post }
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    /// Run all configured pre-tool hooks in order. Returns `Some(reason)` for
    /// the first one that vetoes the call; later hooks are skipped since the
    /// call will not execute anyway.
    pub async fn run_pre(&self, call: &ToolCall, user_prompt: &str, cwd: &str) -> Option<String> {
        for cmd in &self.pre {
            if let Some(reason) = self
                .run_one(cmd, HookEvent::PreToolUse, call, None, user_prompt, cwd)
                .await
            {
                return Some(reason);
            }
        }
        None
    }

    /// Run all configured post-tool hooks. A veto verdict from a post-hook is
    /// logged but ignored — the tool has already executed.
    pub async fn run_post(&self, call: &ToolCall, output: &str, user_prompt: &str, cwd: &str) {
        for cmd in &self.post {
            if self
                .run_one(
                    cmd,
                    HookEvent::PostToolUse,
                    call,
                    Some(output),
                    user_prompt,
                    cwd,
                )
                .await
                .is_some()
            {
                warn!(tool = %call.name, hook = %cmd, "post-tool hook vetoed; ignored, tool already ran");
            }
        }
    }

    async fn run_one(
        &self,
        cmd: &str,
        event: HookEvent,
        call: &ToolCall,
        output: Option<&str>,
        user_prompt: &str,
        cwd: &str,
    ) -> Option<String> {
        let input_json = serde_json::to_string(&call.args).unwrap_or_default();
        let file_path = call
            .args
            .get("path")
            .or_else(|| call.args.get("file_path"))
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let mut process = Command::new("bash");
        process.arg("-c").arg(cmd);
        if !cwd.is_empty() {
            process.current_dir(cwd);
        }
        process.env("WHALE_EVENT", event.as_str());
        process.env("WHALE_TOOL_NAME", &call.name);
        process.env("WHALE_TOOL_INPUT", input_json);
        process.env("WHALE_FILE_PATH", file_path);
        process.env("WHALE_USER_PROMPT", user_prompt);
        process.env("WHALE_CWD", cwd);
        if let Some(out) = output {
            process.env("WHALE_TOOL_OUTPUT", out);
        }
        // Same isolation as the shell tool: no controlling terminal, killed
        // on drop so a timed-out hook never lingers.
        process.stdin(Stdio::null());
        process.kill_on_drop(true);

        let result =
            tokio::time::timeout(Duration::from_secs(HOOK_TIMEOUT_SECS), process.output()).await;

        match result {
            Ok(Ok(out)) => {
                let combined = format!(
                    "{}{}",
                    String::from_utf8_lossy(&out.stdout),
                    String::from_utf8_lossy(&out.stderr)
                );
                let blocked = out.status.code() == Some(BLOCK_EXIT_CODE)
                    || combined.contains(BLOCK_MARKER);
                if !blocked {
                    return None;
                }
                let reason = combined.trim();
                Some(if reason.is_empty() {
                    format!("hook `{cmd}` blocked this call")
                } else {
                    reason.to_string()
                })
            }
            Ok(Err(e)) => {
                warn!(hook = %cmd, error = %e, "hook failed to spawn; ignoring");
                None
            }
            Err(_) => {
                warn!(hook = %cmd, "hook timed out after {HOOK_TIMEOUT_SECS}s; ignoring");
                None
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: name.into(),
            args,
        }
    }

    #[tokio::test]
    async fn empty_hooks_never_block() {
        let r = HookRunner::default();
        assert!(r.is_empty());
        let out = r.run_pre(&call("shell", json!({})), "do it", "").await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn exit_code_77_blocks() {
        let r = HookRunner::new(vec!["exit 77".into()], vec![]);
        let out = r.run_pre(&call("shell", json!({})), "do it", "").await;
        assert!(out.is_some());
    }

    #[tokio::test]
    async fn blocked_marker_blocks_with_reason() {
        let r = HookRunner::new(
            vec!["echo '[blocked] no writes to prod'".into()],
            vec![],
        );
        let out = r
            .run_pre(
                &call("write_file", json!({"path": "/etc/passwd"})),
                "do it",
                "",
            )
            .await;
        assert!(out.unwrap().contains("no writes to prod"));
    }

    #[tokio::test]
    async fn normal_exit_does_not_block() {
        let r = HookRunner::new(vec!["echo ok".into()], vec![]);
        let out = r.run_pre(&call("shell", json!({})), "do it", "").await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn tool_name_is_exposed_via_env() {
        let r = HookRunner::new(
            vec!["[ \"$WHALE_TOOL_NAME\" = \"shell\" ] || exit 77".into()],
            vec![],
        );
        let out = r.run_pre(&call("shell", json!({})), "do it", "").await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn file_path_is_extracted_from_args() {
        let r = HookRunner::new(
            vec!["[ \"$WHALE_FILE_PATH\" = \"/tmp/x\" ] || exit 77".into()],
            vec![],
        );
        let out = r
            .run_pre(&call("write_file", json!({"path": "/tmp/x"})), "", "")
            .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn post_hook_sees_tool_output() {
        let r = HookRunner::new(vec![], vec!["[ -n \"$WHALE_TOOL_OUTPUT\" ] || exit 77".into()]);
        // Fire-and-forget: a post-hook veto cannot surface as a return value,
        // this only checks the call doesn't panic.
        r.run_post(&call("shell", json!({})), "some output", "", "")
            .await;
    }

    #[tokio::test]
    async fn first_blocking_hook_short_circuits_later_ones() {
        let r = HookRunner::new(
            vec!["exit 77".into(), "echo 'should not run' && exit 77".into()],
            vec![],
        );
        let out = r.run_pre(&call("shell", json!({})), "", "").await;
        assert!(out.is_some());
    }
}
