//! Health and status endpoints.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;
use crate::dispatch::DispatchStats;

/// Health check endpoint for liveness probes.
pub async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub config: ConfigEcho,
    pub statistics: DispatchStats,
}

/// The non-sensitive slice of the configuration. The secret is never
/// echoed.
#[derive(Debug, Serialize)]
pub struct ConfigEcho {
    pub listen_addr: String,
    pub rate_limit: usize,
    pub rate_window_secs: u64,
    pub plugin_count: usize,
}

/// Status endpoint: configuration echo plus dispatch statistics.
pub async fn status_handler(State(app_state): State<AppState>) -> Json<StatusResponse> {
    let config = app_state.config();
    Json(StatusResponse {
        status: "running",
        config: ConfigEcho {
            listen_addr: config.listen_addr.to_string(),
            rate_limit: config.rate_limit,
            rate_window_secs: config.rate_window_secs,
            plugin_count: app_state.plugins().plugin_count(),
        },
        statistics: app_state.dispatcher().stats(),
    })
}
