//! HTTP server for health and readiness probes.
//!
//! Runs on a separate tokio task. `/health` reports process liveness
//! unconditionally; `/ready` performs a live probe against the database
//! handle.

use crate::db::Database;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};
use serde_json::json;
use std::net::SocketAddr;

/// Handler for GET /health - always healthy while the process runs.
async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

/// Handler for GET /ready - 200 when the storage backend answers a probe.
async fn ready_handler(State(db): State<Database>) -> impl IntoResponse {
    match db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ready"}))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not ready", "reason": e.to_string()})),
        ),
    }
}

/// Run the HTTP server for health probes.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_health_server(port: u16, db: Database) {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(db);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Health HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("HTTP server error: {}", e);
    }
}
