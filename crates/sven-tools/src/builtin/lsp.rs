// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `category = lsp` tools: thin wrappers over [`sven_lsp`]'s high-level
//! operations. Every tool here borrows a shared `Arc<sven_lsp::LspManager>`
//! the same way built-in local tools borrow `Arc<ToolsConfig>`-derived
//! fields — one manager per conversation, reused across calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sven_lsp::{LspManager, Position};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolCategory, ToolOutput};

fn workspace_root_for(path: &Path) -> PathBuf {
    sven_runtime::find_project_root()
        .ok()
        .unwrap_or_else(|| {
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
}

fn parse_position(call: &ToolCall) -> Result<(PathBuf, Position), ToolOutput> {
    let path = call
        .args
        .get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolOutput::err(&call.id, "missing required 'path' argument"))?;
    let line = call
        .args
        .get("line")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ToolOutput::err(&call.id, "missing required 'line' argument (1-based)"))?
        as u32;
    let character = call
        .args
        .get("character")
        .and_then(|v| v.as_u64())
        .unwrap_or(1) as u32;
    Ok((PathBuf::from(path), Position { line, character }))
}

fn position_schema(extra_props: Value) -> Value {
    let mut props = json!({
        "path": {"type": "string", "description": "File path"},
        "line": {"type": "integer", "description": "1-based line number"},
        "character": {"type": "integer", "description": "1-based column (optional, defaults to 1)"},
    });
    if let (Some(p), Some(e)) = (props.as_object_mut(), extra_props.as_object()) {
        for (k, v) in e {
            p.insert(k.clone(), v.clone());
        }
    }
    json!({
        "type": "object",
        "properties": props,
        "required": ["path", "line"],
        "additionalProperties": false,
    })
}

macro_rules! position_tool {
    ($struct_name:ident, $name:literal, $desc:literal, $op:path) => {
        pub struct $struct_name {
            pub manager: Arc<LspManager>,
        }

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &str {
                $name
            }
            fn description(&self) -> &str {
                $desc
            }
            fn parameters_schema(&self) -> Value {
                position_schema(json!({}))
            }
            fn default_policy(&self) -> ApprovalPolicy {
                ApprovalPolicy::Auto
            }
            fn category(&self) -> ToolCategory {
                ToolCategory::Lsp
            }
            fn read_only(&self) -> bool {
                true
            }
            async fn execute(&self, call: &ToolCall) -> ToolOutput {
                let (path, pos) = match parse_position(call) {
                    Ok(v) => v,
                    Err(out) => return out,
                };
                let root = workspace_root_for(&path);
                match $op(&self.manager, &root, &path, pos).await {
                    Ok(text) => ToolOutput::ok(&call.id, text),
                    Err(e) => ToolOutput::err(&call.id, e.to_string()),
                }
            }
        }
    };
}

position_tool!(
    HoverTool,
    "lsp_hover",
    "Show type/doc information for the symbol at a file position.",
    sven_lsp::ops::hover
);
position_tool!(
    GoToDefinitionTool,
    "lsp_go_to_definition",
    "Find the definition site(s) of the symbol at a file position.",
    sven_lsp::ops::go_to_definition
);
position_tool!(
    GoToImplementationTool,
    "lsp_go_to_implementation",
    "Find the implementation site(s) of the symbol at a file position.",
    sven_lsp::ops::go_to_implementation
);
position_tool!(
    FindReferencesTool,
    "lsp_find_references",
    "Find every reference to the symbol at a file position.",
    sven_lsp::ops::find_references
);
position_tool!(
    PrepareCallHierarchyTool,
    "lsp_prepare_call_hierarchy",
    "Resolve the call-hierarchy item at a file position (prerequisite for incoming/outgoing calls).",
    sven_lsp::ops::prepare_call_hierarchy
);
position_tool!(
    IncomingCallsTool,
    "lsp_incoming_calls",
    "List callers of the function at a file position.",
    sven_lsp::ops::incoming_calls
);
position_tool!(
    OutgoingCallsTool,
    "lsp_outgoing_calls",
    "List functions called by the function at a file position.",
    sven_lsp::ops::outgoing_calls
);

pub struct DocumentSymbolTool {
    pub manager: Arc<LspManager>,
}

#[async_trait]
impl Tool for DocumentSymbolTool {
    fn name(&self) -> &str {
        "lsp_document_symbol"
    }
    fn description(&self) -> &str {
        "List all symbols (functions, types, etc.) declared in one file."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string", "description": "File path"}},
            "required": ["path"],
            "additionalProperties": false,
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Lsp
    }
    fn read_only(&self) -> bool {
        true
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required 'path' argument");
        };
        let path = PathBuf::from(path);
        let root = workspace_root_for(&path);
        match sven_lsp::ops::document_symbol(&self.manager, &root, &path).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

pub struct WorkspaceSymbolTool {
    pub manager: Arc<LspManager>,
}

#[async_trait]
impl Tool for WorkspaceSymbolTool {
    fn name(&self) -> &str {
        "lsp_workspace_symbol"
    }
    fn description(&self) -> &str {
        "Search for a symbol by name across the whole project."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Symbol name (substring) to search for"},
                "language": {"type": "string", "description": "Language id or extension, e.g. 'rust' or 'ts'"},
                "workspace_root": {"type": "string", "description": "Project root (optional; auto-detected)"},
            },
            "required": ["query", "language"],
            "additionalProperties": false,
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Lsp
    }
    fn read_only(&self) -> bool {
        true
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(query) = call.args.get("query").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required 'query' argument");
        };
        let Some(language) = call.args.get("language").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required 'language' argument");
        };
        let Some(language_id) = sven_lsp::canonical_language_id(language) else {
            return ToolOutput::err(&call.id, format!("unsupported language '{language}'"));
        };
        let root = call
            .args
            .get("workspace_root")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .or_else(|| sven_runtime::find_project_root().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        match sven_lsp::ops::workspace_symbol(&self.manager, &root, language_id, query).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}
