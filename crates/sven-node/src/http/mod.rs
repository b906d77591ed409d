// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! HTTPS server — bearer-token-authenticated WebSocket control plane.
//!
//! Routes:
//! - `GET /ws`      — WebSocket upgrade, bridges JSON ↔ `ControlCommand`/`ControlEvent`.
//! - `GET /healthz` — unauthenticated liveness probe.

pub mod auth;
pub mod tls;
pub mod ws;

use std::net::SocketAddr;

use axum::{
    middleware,
    routing::{get, Router},
};
use tracing::info;

use axum_server::tls_rustls::RustlsConfig;

use crate::{config::HttpConfig, control::service::AgentHandle};
use auth::AuthState;

async fn healthz() -> &'static str {
    "ok"
}

/// Build the router and serve it, with or without TLS depending on
/// `config.insecure_dev_mode`. Blocks until the server shuts down.
pub async fn serve(
    config: &HttpConfig,
    agent: AgentHandle,
    token_hash: crate::crypto::token::StoredToken,
    cert_dir: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let auth_state = AuthState::with_defaults(token_hash);

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth::bearer_auth_mw,
        ))
        .route("/healthz", get(healthz))
        .with_state(agent)
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            config.max_body_bytes,
        ));

    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {:?}: {e}", config.bind))?;

    if config.insecure_dev_mode {
        info!(%addr, "starting HTTP gateway (insecure_dev_mode — TLS disabled)");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        return Ok(());
    }

    let cert_dir = cert_dir.unwrap_or_else(tls::default_cert_dir);
    let runtime = tls::load_or_generate(&cert_dir)?;
    info!(%addr, fingerprint = %runtime.fingerprint_sha256, "starting HTTPS gateway");

    let rustls_config = RustlsConfig::from_pem_file(&runtime.cert_path, &runtime.key_path).await?;

    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
