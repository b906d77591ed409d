// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use sven_config::AgentMode;

use crate::hooks::HookRunner;
use crate::{OutputCategory, Tool, ToolCall, ToolOutput};

/// A tool schema – mirrors sven_model::ToolSchema but keeps tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    hooks: HookRunner,
    /// When `Some`, only these tool names are exposed or executable
    /// (`--allowed-tools`). Checked before `disallowed`.
    allowed: Option<std::collections::HashSet<String>>,
    /// Tool names refused regardless of registration (`--disallowed-tools`).
    disallowed: std::collections::HashSet<String>,
}

// SAFETY: ToolRegistry is Sync because:
// - HashMap<String, Arc<dyn Tool>> is Sync (String is Sync, Arc<T: Send + Sync> is Sync)
// - Tools implement Send + Sync (required by the Tool trait)
// - No interior mutability exists after construction (all methods take &self)
// - Parallel tool execution is safe because tools are immutable after registration
unsafe impl Sync for ToolRegistry {}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            hooks: HookRunner::default(),
            allowed: None,
            disallowed: std::collections::HashSet::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Attach the pre/post-tool hook runner built from `ToolsConfig::hooks`.
    pub fn set_hooks(&mut self, hooks: HookRunner) {
        self.hooks = hooks;
    }

    /// Restrict the registry per `--allowed-tools`/`--disallowed-tools`.
    /// An empty `allowed` list means "no restriction" (all registered tools
    /// stay visible); a non-empty one is an exact allowlist.
    pub fn set_tool_filter(&mut self, allowed: Vec<String>, disallowed: Vec<String>) {
        self.allowed = if allowed.is_empty() {
            None
        } else {
            Some(allowed.into_iter().collect())
        };
        self.disallowed = disallowed.into_iter().collect();
    }

    /// Whether `name` may be listed/executed under the current filter.
    fn is_permitted(&self, name: &str) -> bool {
        if self.disallowed.contains(name) {
            return false;
        }
        match &self.allowed {
            Some(set) => set.contains(name),
            None => true,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if !self.is_permitted(name) {
            return None;
        }
        self.tools.get(name).cloned()
    }

    /// Produce schemas for ALL registered tools (mode-unfiltered).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values()
            .filter(|t| self.is_permitted(t.name()))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            }).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Produce schemas only for tools available in the given mode.
    pub fn schemas_for_mode(&self, mode: AgentMode) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values()
            .filter(|t| t.modes().contains(&mode) && self.is_permitted(t.name()))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Dispatch `call` through the pre-hook → tool → post-hook pipeline.
    ///
    /// `cwd` and `user_prompt` are forwarded to hook commands as
    /// `WHALE_CWD`/`WHALE_USER_PROMPT`. A pre-hook veto synthesizes an error
    /// result carrying the veto reason and the tool is never invoked.
    pub async fn execute(&self, call: &ToolCall, cwd: &str, user_prompt: &str) -> ToolOutput {
        if !self.is_permitted(&call.name) {
            return ToolOutput::err(
                &call.id,
                format!("tool `{}` is not permitted (--allowed-tools/--disallowed-tools)", call.name),
            );
        }

        if !self.hooks.is_empty() {
            if let Some(reason) = self.hooks.run_pre(call, user_prompt, cwd).await {
                return ToolOutput::err(&call.id, format!("[blocked] {reason}"));
            }
        }

        let output = match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(
                &call.id,
                format!("unknown tool: {}", call.name),
            ),
        };

        if !self.hooks.is_empty() {
            self.hooks
                .run_post(call, &output.content, user_prompt, cwd)
                .await;
        }

        output
    }

    /// Output category of a registered tool, used by the turn loop's smart
    /// truncation to decide whether to keep head+tail, matched lines, file
    /// content, or a generic truncation window. Unknown tool names fall back
    /// to `OutputCategory::Generic`.
    pub fn output_category(&self, name: &str) -> OutputCategory {
        self.tools
            .get(name)
            .map(|t| t.output_category())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys()
            .filter(|n| self.is_permitted(n))
            .cloned()
            .collect()
    }

    pub fn names_for_mode(&self, mode: AgentMode) -> Vec<String> {
        let mut names: Vec<String> = self.tools.values()
            .filter(|t| t.modes().contains(&mode) && self.is_permitted(t.name()))
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::policy::ApprovalPolicy;
    use crate::tool::{Tool, ToolCall, ToolOutput};

    /// Minimal no-op tool for registry tests.
    struct EchoTool { name: &'static str }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "echoes its input" }
        fn parameters_schema(&self) -> Value { json!({ "type": "object" }) }
        fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn names_returns_all_registered() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "a" });
        reg.register(EchoTool { name: "b" });
        let mut names = reg.names();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn schemas_contains_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "my_tool" });
        let schemas = reg.schemas();
        assert!(schemas.iter().any(|s| s.name == "my_tool"));
    }

    #[test]
    fn schemas_include_description() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        let schemas = reg.schemas();
        assert_eq!(schemas[0].description, "echoes its input");
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"x":1}) };
        let out = reg.execute(&call, "", "").await;
        assert!(!out.is_error);
        assert!(out.content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let reg = ToolRegistry::new();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call, "", "").await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn pre_hook_veto_blocks_execution() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        reg.set_hooks(crate::hooks::HookRunner::new(vec!["exit 77".into()], vec![]));
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({}) };
        let out = reg.execute(&call, "", "").await;
        assert!(out.is_error);
        assert!(out.content.contains("[blocked]"));
    }

    #[tokio::test]
    async fn disallowed_tool_is_refused() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        reg.set_tool_filter(vec![], vec!["echo".into()]);
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({}) };
        let out = reg.execute(&call, "", "").await;
        assert!(out.is_error);
        assert!(reg.get("echo").is_none());
    }

    #[tokio::test]
    async fn allowed_tools_is_an_exact_allowlist() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        reg.register(EchoTool { name: "other" });
        reg.set_tool_filter(vec!["echo".into()], vec![]);
        assert!(reg.get("echo").is_some());
        assert!(reg.get("other").is_none());
        assert_eq!(reg.names(), vec!["echo".to_string()]);
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.names().len(), 1);
    }

    #[test]
    fn output_category_delegates_to_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert_eq!(reg.output_category("echo"), OutputCategory::Generic);
    }

    #[test]
    fn output_category_unknown_tool_is_generic() {
        let reg = ToolRegistry::new();
        assert_eq!(reg.output_category("nope"), OutputCategory::Generic);
    }
}
