//! HTTP surface over [`Bridge`].
//!
//! Routes:
//! - `POST /api/invoke` `{tool, arguments?, refresh?}`
//! - `POST /api/cache/clear`
//! - `GET /api/worker/status`
//! - `GET /health`

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mcp_bridge::{Arguments, Bridge, BridgeStatus, InvokeOptions};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::error;

#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
}

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub refresh: bool,
}

pub fn build_router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/api/invoke", post(invoke))
        .route("/api/cache/clear", post(clear_cache))
        .route("/api/worker/status", get(worker_status))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { bridge })
}

async fn invoke(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error::bad_request("invalid_request", rejection.body_text()),
    };

    let tool = request.tool.trim();
    if tool.is_empty() {
        return error::bad_request("missing_tool", "tool must not be empty");
    }
    let arguments: Arguments = match request.arguments {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return error::bad_request("invalid_arguments", "arguments must be a JSON object")
        }
    };

    let options = InvokeOptions {
        refresh: request.refresh,
        ..Default::default()
    };
    match state.bridge.invoke_with(tool, arguments, options).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => {
            warn!(tool, kind = %e.kind(), error = %e.message(), "Invoke failed");
            error::bridge_error(&e)
        }
    }
}

async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    let entries = state.bridge.clear_cache();
    Json(json!({ "cleared": true, "entries": entries }))
}

async fn worker_status(State(state): State<AppState>) -> Json<BridgeStatus> {
    Json(state.bridge.inspect())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Serves the router until Ctrl-C or SIGTERM.
pub async fn serve(address: &str, bridge: Arc<Bridge>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!(address, "HTTP server listening");

    axum::serve(listener, build_router(bridge))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
