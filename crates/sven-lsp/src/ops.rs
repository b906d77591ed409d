// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! High-level LSP operations: each takes a 1-based (line, character) and
//! returns a formatted multi-line string the model can read directly,
//! rather than raw JSON.

use std::path::Path;

use serde_json::{json, Value};

use crate::error::Result;
use crate::manager::{LspManager, ServerHandle};
use crate::sync::path_to_uri;

/// A query position. LSP is 0-based internally; callers of this crate pass
/// 1-based line/character (editor convention) and this module converts.
#[derive(Debug, Clone, Copy)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    fn to_lsp(self) -> Value {
        json!({"line": self.line.saturating_sub(1), "character": self.character.saturating_sub(1)})
    }
}

async fn query_at(
    manager: &LspManager,
    workspace_root: &Path,
    path: &Path,
    pos: Position,
    method: &'static str,
    extra: Value,
) -> Result<Value> {
    let handle = manager.server_for_path(path, workspace_root).await?;
    manager.ensure_synced(&handle, path).await?;
    let uri = path_to_uri(path);
    let mut params = json!({
        "textDocument": {"uri": uri},
        "position": pos.to_lsp(),
    });
    if let (Some(p), Some(e)) = (params.as_object_mut(), extra.as_object()) {
        for (k, v) in e {
            p.insert(k.clone(), v.clone());
        }
    }
    handle.request(method, params).await
}

pub async fn hover(
    manager: &LspManager,
    workspace_root: &Path,
    path: &Path,
    pos: Position,
) -> Result<String> {
    let result = query_at(manager, workspace_root, path, pos, "textDocument/hover", json!({})).await?;
    Ok(format_hover(&result))
}

pub async fn go_to_definition(
    manager: &LspManager,
    workspace_root: &Path,
    path: &Path,
    pos: Position,
) -> Result<String> {
    let result = query_at(
        manager,
        workspace_root,
        path,
        pos,
        "textDocument/definition",
        json!({}),
    )
    .await?;
    Ok(format_locations(&result, "definition"))
}

pub async fn go_to_implementation(
    manager: &LspManager,
    workspace_root: &Path,
    path: &Path,
    pos: Position,
) -> Result<String> {
    let result = query_at(
        manager,
        workspace_root,
        path,
        pos,
        "textDocument/implementation",
        json!({}),
    )
    .await?;
    Ok(format_locations(&result, "implementation"))
}

pub async fn find_references(
    manager: &LspManager,
    workspace_root: &Path,
    path: &Path,
    pos: Position,
) -> Result<String> {
    let result = query_at(
        manager,
        workspace_root,
        path,
        pos,
        "textDocument/references",
        json!({"context": {"includeDeclaration": true}}),
    )
    .await?;
    Ok(format_locations(&result, "reference"))
}

pub async fn document_symbol(manager: &LspManager, workspace_root: &Path, path: &Path) -> Result<String> {
    let handle = manager.server_for_path(path, workspace_root).await?;
    manager.ensure_synced(&handle, path).await?;
    let uri = path_to_uri(path);
    let result = handle
        .request(
            "textDocument/documentSymbol",
            json!({"textDocument": {"uri": uri}}),
        )
        .await?;
    Ok(format_symbols(&result))
}

pub async fn workspace_symbol(
    manager: &LspManager,
    workspace_root: &Path,
    language_id: &str,
    query: &str,
) -> Result<String> {
    let handle = manager.get_or_spawn(language_id, workspace_root).await?;
    let result = handle
        .request("workspace/symbol", json!({"query": query}))
        .await?;
    Ok(format_symbols(&result))
}

pub async fn prepare_call_hierarchy(
    manager: &LspManager,
    workspace_root: &Path,
    path: &Path,
    pos: Position,
) -> Result<String> {
    let result = query_at(
        manager,
        workspace_root,
        path,
        pos,
        "textDocument/prepareCallHierarchy",
        json!({}),
    )
    .await?;
    Ok(format_call_hierarchy_items(&result))
}

pub async fn incoming_calls(
    manager: &LspManager,
    workspace_root: &Path,
    path: &Path,
    pos: Position,
) -> Result<String> {
    let items = query_at(
        manager,
        workspace_root,
        path,
        pos,
        "textDocument/prepareCallHierarchy",
        json!({}),
    )
    .await?;
    let Some(item) = items.as_array().and_then(|a| a.first()) else {
        return Ok("no call-hierarchy item at this position".to_string());
    };
    let handle = manager.server_for_path(path, workspace_root).await?;
    let result = handle
        .request("callHierarchy/incomingCalls", json!({"item": item}))
        .await?;
    Ok(format_calls(&result, "from"))
}

pub async fn outgoing_calls(
    manager: &LspManager,
    workspace_root: &Path,
    path: &Path,
    pos: Position,
) -> Result<String> {
    let items = query_at(
        manager,
        workspace_root,
        path,
        pos,
        "textDocument/prepareCallHierarchy",
        json!({}),
    )
    .await?;
    let Some(item) = items.as_array().and_then(|a| a.first()) else {
        return Ok("no call-hierarchy item at this position".to_string());
    };
    let handle = manager.server_for_path(path, workspace_root).await?;
    let result = handle
        .request("callHierarchy/outgoingCalls", json!({"item": item}))
        .await?;
    Ok(format_calls(&result, "to"))
}

// ── formatting ──────────────────────────────────────────────────────────────

fn uri_to_display(uri: &str) -> String {
    uri.strip_prefix("file://").unwrap_or(uri).to_string()
}

fn format_hover(value: &Value) -> String {
    if value.is_null() {
        return "no hover information available".to_string();
    }
    let contents = &value["contents"];
    if let Some(s) = contents.as_str() {
        return s.to_string();
    }
    if let Some(s) = contents.get("value").and_then(|v| v.as_str()) {
        return s.to_string();
    }
    if let Some(arr) = contents.as_array() {
        return arr
            .iter()
            .filter_map(|c| c.as_str().map(str::to_string).or_else(|| {
                c.get("value").and_then(|v| v.as_str()).map(str::to_string)
            }))
            .collect::<Vec<_>>()
            .join("\n---\n");
    }
    "no hover information available".to_string()
}

fn format_locations(value: &Value, label: &str) -> String {
    let locations: Vec<&Value> = match value {
        Value::Array(arr) => arr.iter().collect(),
        Value::Null => vec![],
        single => vec![single],
    };
    if locations.is_empty() {
        return format!("no {label} found");
    }

    let mut by_file: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for loc in locations {
        let uri = loc
            .get("uri")
            .or_else(|| loc.get("targetUri"))
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown>");
        let range = loc.get("range").or_else(|| loc.get("targetRange"));
        let line = range
            .and_then(|r| r.get("start"))
            .and_then(|s| s.get("line"))
            .and_then(|v| v.as_u64())
            .map(|l| l + 1)
            .unwrap_or(0);
        let col = range
            .and_then(|r| r.get("start"))
            .and_then(|s| s.get("character"))
            .and_then(|v| v.as_u64())
            .map(|c| c + 1)
            .unwrap_or(0);
        by_file
            .entry(uri_to_display(uri))
            .or_default()
            .push(format!("  {line}:{col}"));
    }

    let total: usize = by_file.values().map(|v| v.len()).sum();
    let mut out = format!("{total} {label}(s):\n");
    for (file, positions) in by_file {
        out.push_str(&format!("{file}\n{}\n", positions.join("\n")));
    }
    out.trim_end().to_string()
}

fn format_symbols(value: &Value) -> String {
    let Some(arr) = value.as_array() else {
        return "no symbols found".to_string();
    };
    if arr.is_empty() {
        return "no symbols found".to_string();
    }

    let mut by_file: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for sym in arr {
        let name = sym.get("name").and_then(|v| v.as_str()).unwrap_or("?");
        let kind = sym
            .get("kind")
            .and_then(|v| v.as_u64())
            .map(symbol_kind_name)
            .unwrap_or("symbol");
        // DocumentSymbol has `range`; SymbolInformation/WorkspaceSymbol has `location.{uri,range}`.
        let (uri, line) = if let Some(loc) = sym.get("location") {
            let uri = loc.get("uri").and_then(|v| v.as_str()).unwrap_or("<unknown>");
            let line = loc
                .get("range")
                .and_then(|r| r.get("start"))
                .and_then(|s| s.get("line"))
                .and_then(|v| v.as_u64())
                .map(|l| l + 1)
                .unwrap_or(0);
            (uri.to_string(), line)
        } else {
            let line = sym
                .get("range")
                .and_then(|r| r.get("start"))
                .and_then(|s| s.get("line"))
                .and_then(|v| v.as_u64())
                .map(|l| l + 1)
                .unwrap_or(0);
            ("<this file>".to_string(), line)
        };
        by_file
            .entry(uri_to_display(&uri))
            .or_default()
            .push(format!("  {line}: {kind} {name}"));
    }

    let mut out = String::new();
    for (file, syms) in by_file {
        out.push_str(&format!("{file}\n{}\n", syms.join("\n")));
    }
    out.trim_end().to_string()
}

fn format_call_hierarchy_items(value: &Value) -> String {
    let Some(arr) = value.as_array() else {
        return "no call-hierarchy item at this position".to_string();
    };
    if arr.is_empty() {
        return "no call-hierarchy item at this position".to_string();
    }
    arr.iter()
        .map(|item| {
            let name = item.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let uri = item.get("uri").and_then(|v| v.as_str()).unwrap_or("<unknown>");
            format!("{name}  ({})", uri_to_display(uri))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_calls(value: &Value, direction: &str) -> String {
    let Some(arr) = value.as_array() else {
        return format!("no calls {direction}");
    };
    if arr.is_empty() {
        return format!("no calls {direction}");
    }
    arr.iter()
        .map(|call| {
            let key = if direction == "from" { "from" } else { "to" };
            let item = &call[key];
            let name = item.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let uri = item.get("uri").and_then(|v| v.as_str()).unwrap_or("<unknown>");
            format!("  {name}  ({})", uri_to_display(uri))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// LSP `SymbolKind` numeric values (subset actually rendered).
fn symbol_kind_name(kind: u64) -> &'static str {
    match kind {
        2 => "module",
        5 => "class",
        6 => "method",
        8 => "field",
        9 => "constructor",
        10 => "enum",
        11 => "interface",
        12 => "function",
        13 => "variable",
        14 => "constant",
        23 => "struct",
        _ => "symbol",
    }
}
