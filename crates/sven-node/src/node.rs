// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Node startup — assembles the per-connection agent factory and starts the
//! HTTPS server.
//!
//! # Startup sequence
//!
//! [`run`] performs these steps in order:
//!
//! 1. Build the model provider from config.
//! 2. Wrap it in an [`AgentHandle`] — the factory every websocket connection
//!    uses to build its own `Agent`.
//! 3. Load or generate the HTTP bearer token.
//! 4. Start the Axum HTTPS server (blocks until shutdown).

use std::{path::PathBuf, sync::Arc};

use tracing::info;

use crate::{config::GatewayConfig, control::service::AgentHandle, crypto::token::StoredTokenFile};

/// Start the node, assembling the agent factory and HTTP server.
///
/// This is the single entry point for `sven node start`. It owns the full
/// lifecycle: model construction, agent factory, HTTP server.
pub async fn run(
    config: GatewayConfig,
    sven_config: Arc<sven_config::Config>,
) -> anyhow::Result<()> {
    // ── Agent factory ────────────────────────────────────────────────────────
    let model: Arc<dyn sven_model::ModelProvider> = Arc::from(sven_model::from_config(&sven_config.model)?);
    let agent_handle = AgentHandle::new(sven_config.clone(), model);

    // ── Token ─────────────────────────────────────────────────────────────────
    let token_path = config
        .http
        .token_file
        .clone()
        .unwrap_or_else(default_token_path);
    let token_hash = if token_path.exists() {
        info!(
            token_file = %token_path.display(),
            "HTTP bearer token loaded (use SVEN_NODE_TOKEN or --token to connect)",
        );
        StoredTokenFile::load(&token_path)?.token_hash
    } else {
        let raw = StoredTokenFile::generate_and_save(&token_path)?;
        info!("=======================================================");
        info!("HTTP bearer token (shown once — save it now!):");
        info!("  {}", raw.as_str());
        info!("  export SVEN_NODE_TOKEN={}", raw.as_str());
        info!("=======================================================");
        StoredTokenFile::load(&token_path)?.token_hash
    };

    // ── HTTP server (blocks until shutdown) ───────────────────────────────────
    info!(
        bind = %config.http.bind,
        tls = !config.http.insecure_dev_mode,
        "starting HTTP node",
    );

    crate::http::serve(
        &config.http,
        agent_handle,
        token_hash,
        config.http.tls_cert_dir.clone(),
    )
    .await?;

    Ok(())
}

// ── Node exec (send task to a running node) ───────────────────────────────────

/// Send a single task to a running node, stream the response to stdout.
///
/// Loads the node's self-signed TLS cert from the cert dir and trusts it
/// explicitly — no system roots needed, no danger flags. Pass `insecure =
/// true` to skip cert verification entirely (useful when `insecure_dev_mode`
/// is enabled or the cert dir is unavailable).
pub async fn exec_task(
    config: &GatewayConfig,
    url: &str,
    token: &str,
    task: &str,
    insecure: bool,
) -> anyhow::Result<()> {
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::{connect_async_tls_with_config, Connector};
    use tungstenite::http::Request;

    use crate::control::protocol::{ControlCommand, ControlEvent};

    // Build the TLS connector — trust only the node's own cert.
    let connector = {
        let mut builder = native_tls::TlsConnector::builder();
        if insecure {
            builder.danger_accept_invalid_certs(true);
        } else {
            let cert_dir = config
                .http
                .tls_cert_dir
                .clone()
                .unwrap_or_else(crate::http::tls::default_cert_dir);
            let cert_path = cert_dir.join("gateway-cert.pem");
            match std::fs::read(&cert_path) {
                Ok(pem) => match native_tls::Certificate::from_pem(&pem) {
                    Ok(cert) => {
                        builder
                            .disable_built_in_roots(true)
                            .add_root_certificate(cert)
                            // The cert CN is "sven-node", not "127.0.0.1".
                            // We still verify the cert itself — just not the hostname.
                            .danger_accept_invalid_hostnames(true);
                    }
                    Err(e) => {
                        anyhow::bail!(
                            "could not parse TLS cert from {}: {e}\n\
                             Hint: run with --insecure for dev nodes.",
                            cert_path.display()
                        );
                    }
                },
                Err(_) => {
                    anyhow::bail!(
                        "TLS cert not found at {}.\n\
                         Either start the node first, or use --insecure.",
                        cert_path.display()
                    );
                }
            }
        }
        Connector::NativeTls(builder.build()?)
    };

    // Build the WebSocket request with the bearer token.
    let request = Request::builder()
        .uri(url)
        .header("Authorization", format!("Bearer {token}"))
        .header("Host", "127.0.0.1")
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", generate_ws_key())
        .header("Sec-WebSocket-Version", "13")
        .body(())?;

    let (mut ws, _) = connect_async_tls_with_config(request, None, false, Some(connector))
        .await
        .map_err(|e| anyhow::anyhow!("could not connect to node at {url}: {e}"))?;

    // Submit the task as a fresh conversation.
    let query = serde_json::to_string(&ControlCommand::Query {
        prompt: task.to_string(),
        store_id: None,
        conversation_id: None,
        config: None,
    })?;
    ws.send(tungstenite::Message::Text(query)).await?;

    // Stream events until the turn completes.
    while let Some(msg) = ws.next().await {
        let msg = msg.map_err(|e| anyhow::anyhow!("WebSocket error: {e}"))?;
        let text = match msg {
            tungstenite::Message::Text(t) => t,
            tungstenite::Message::Close(_) => break,
            _ => continue,
        };

        let event: ControlEvent = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(_) => continue, // ignore unparseable frames
        };

        match event {
            ControlEvent::Text { delta, .. } => {
                print!("{delta}");
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
            ControlEvent::ToolStart { tool_name, .. } => {
                eprintln!("[tool: {tool_name}]");
            }
            ControlEvent::ToolResult { is_error, output, .. } => {
                if is_error {
                    eprintln!("[tool error: {output}]");
                }
            }
            ControlEvent::Done { .. } => {
                println!();
                break;
            }
            ControlEvent::Aborted => {
                eprintln!("[aborted]");
                break;
            }
            ControlEvent::Error { message } => {
                anyhow::bail!("node error: {message}");
            }
            _ => {}
        }
    }

    Ok(())
}

fn generate_ws_key() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 16];
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Regenerate the HTTP bearer token, printing the new raw token once.
pub fn regenerate_token(config: &GatewayConfig) -> anyhow::Result<()> {
    let token_path = config
        .http
        .token_file
        .clone()
        .unwrap_or_else(default_token_path);
    let raw = StoredTokenFile::generate_and_save(&token_path)?;
    println!("New bearer token (save it now — it won't be shown again):");
    println!("  {}", raw.as_str());
    println!();
    println!("Usage:  Authorization: Bearer {}", raw.as_str());
    Ok(())
}

// ── Default paths ─────────────────────────────────────────────────────────────

pub fn default_token_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/sven/gateway/token.yaml")
}
