use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::state::ServerState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ServerInfoResponse {
    pub site_name: String,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
}

/// Liveness endpoint; degraded when the database does not answer
pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("Health check database ping failed: {}", e);
            "unreachable"
        }
    };

    Json(HealthResponse {
        status: if database == "ok" { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        database,
    })
}

/// Basic server metadata for clients
pub async fn server_info(State(state): State<Arc<ServerState>>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        site_name: state.config.site_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: state.sessions.count(),
    })
}
