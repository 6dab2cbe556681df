// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Demo server
//!
//! | path | method | encrypted |
//! |---|---|---|
//! | handshake path | POST | no |
//! | `/health` | GET | no (excluded) |
//! | `/metrics` | GET | no (excluded) |
//! | `/api/echo` | POST | yes; echoes the JSON body plus `receivedAt` |
//! | `/api/session` | GET | yes (empty envelope); reports the session id and `seq` |
//! | `/api/session` | DELETE | yes (empty envelope); ends the session |

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use clap::Args;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::load_config;
use crate::config::E2eeConfig;
use crate::session::InMemorySessionStore;
use crate::transport::{headers as gao_headers, protect, E2eeTransport, SessionInfo, TransportError};

/// Paths every demo deployment leaves in plaintext
pub const DEMO_EXCLUDED_PATHS: &[&str] = &["/health", "/metrics"];

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "GAO_E2EE_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// TOML config file; `GAO_E2EE_*` variables override it
    #[arg(long, env = "GAO_E2EE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Clone)]
pub struct DemoState {
    transport: E2eeTransport,
    store: InMemorySessionStore,
}

pub async fn serve(args: ServeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    run_server(config, args.listen).await
}

/// Build the transport, start the sweeper and serve until Ctrl-C
pub async fn run_server(config: E2eeConfig, addr: SocketAddr) -> Result<()> {
    let config = with_demo_exclusions(config);
    let (transport, store) = E2eeTransport::in_memory(config)?;
    let sweeper = store.spawn_sweeper(transport.config().sweep_interval());

    info!(
        "E2EE transport enabled={} handshake={} enforce_encryption={}",
        transport.config().enabled,
        transport.config().handshake_path,
        transport.config().enforce_encryption
    );

    let app = demo_app(transport, store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 {} listening on {}", crate::version::get_version_string(), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// The demo router, protected by `transport`
pub fn demo_app(transport: E2eeTransport, store: InMemorySessionStore) -> Router {
    let state = DemoState {
        transport: transport.clone(),
        store,
    };

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/echo", post(echo_handler))
        .route(
            "/api/session",
            get(session_handler).delete(end_session_handler),
        );

    protect(router, transport)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([
                    HeaderName::from_static(gao_headers::ENCRYPTED),
                    HeaderName::from_static(gao_headers::SEQUENCE),
                ]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Add the demo's plaintext paths to the configured exclusions
pub fn with_demo_exclusions(mut config: E2eeConfig) -> E2eeConfig {
    for path in DEMO_EXCLUDED_PATHS {
        if !config.excluded_paths.iter().any(|p| p.as_str() == *path) {
            config.excluded_paths.push(path.to_string());
        }
    }
    config
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::version::get_version_info(),
    }))
}

async fn metrics_handler(State(state): State<DemoState>) -> impl IntoResponse {
    let live = state.store.live_count().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.transport.metrics().export_prometheus(live),
    )
}

async fn echo_handler(Json(body): Json<Value>) -> impl IntoResponse {
    let received_at = chrono::Utc::now().to_rfc3339();
    let reply = match body {
        Value::Object(mut object) => {
            object.insert("receivedAt".to_string(), Value::String(received_at));
            Value::Object(object)
        }
        other => json!({ "echo": other, "receivedAt": received_at }),
    };
    Json(reply)
}

/// Session routes only serve requests whose envelope authenticated
fn require_session(info: Option<Extension<SessionInfo>>) -> Result<SessionInfo, TransportError> {
    info.map(|Extension(info)| info)
        .ok_or(TransportError::EncryptionRequired)
}

async fn session_handler(
    info: Option<Extension<SessionInfo>>,
) -> Result<impl IntoResponse, TransportError> {
    let info = require_session(info)?;
    Ok(Json(json!({
        "sessionId": info.session_id,
        "seq": info.seq,
    })))
}

async fn end_session_handler(
    State(state): State<DemoState>,
    info: Option<Extension<SessionInfo>>,
) -> Result<impl IntoResponse, TransportError> {
    let info = require_session(info)?;
    state.transport.end_session(&info.session_id).await?;
    Ok(Json(json!({ "ended": info.session_id })))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
