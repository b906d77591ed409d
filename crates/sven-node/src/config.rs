// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Node configuration loaded from YAML.
//!
//! Configuration is YAML (never TOML). Layers are **deep-merged** — you can
//! override only the fields you care about in each file.
//!
//! Search order (later overrides earlier):
//! 1. `/etc/sven/node.yaml`
//! 2. `~/.config/sven/node.yaml`
//! 3. `.sven/node.yaml` (workspace-local)
//! 4. Path given to [`load`] explicitly.
//!
//! **All defaults are production-safe.** Running `load(None)` with no config
//! file gives you TLS on and loopback bind.
//!
//! # Loading
//!
//! ```rust
//! use sven_node::config::{GatewayConfig, load};
//!
//! let config = load(None).unwrap();
//! assert!(!config.http.insecure_dev_mode);             // TLS is on
//! assert!(config.http.bind.starts_with("127.0.0.1"));  // loopback only
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_http_bind() -> String {
    "127.0.0.1:18790".to_string()
}

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub http: HttpConfig,
}

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// `host:port` to listen on. Default: `127.0.0.1:18790` (loopback only).
    #[serde(default = "default_http_bind")]
    pub bind: String,

    /// TLS is **enabled by default**. Set this to `true` only for local
    /// development. The flag is intentionally named to make it uncomfortable
    /// to leave on in production.
    #[serde(default)]
    pub insecure_dev_mode: bool,

    /// Directory where the auto-generated ECDSA P-256 certificate and private
    /// key are stored. Defaults to `~/.config/sven/gateway/tls/`.
    pub tls_cert_dir: Option<PathBuf>,

    /// Path to the YAML file that stores the SHA-256 hashed HTTP bearer token.
    /// If `None`, the token file is auto-located at
    /// `~/.config/sven/gateway/token.yaml`.
    pub token_file: Option<PathBuf>,

    /// Maximum request body size in bytes (default: 4 MiB).
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

fn default_max_body() -> usize {
    4 * 1024 * 1024
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            insecure_dev_mode: false,
            tls_cert_dir: None,
            token_file: None,
            max_body_bytes: default_max_body(),
        }
    }
}

// ── Loader ────────────────────────────────────────────────────────────────────

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    paths.push(PathBuf::from("/etc/sven/node.yaml"));
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/sven/node.yaml"));
    }
    paths.push(PathBuf::from(".sven/node.yaml"));
    paths
}

pub fn load(extra: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading node config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit node config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let config: GatewayConfig = if matches!(&merged, serde_yaml::Value::Mapping(m) if m.is_empty())
    {
        GatewayConfig::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    Ok(config)
}

fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
