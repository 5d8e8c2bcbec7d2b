//! HTTP ingress for GitHub webhooks.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Verifies, rate-limits, classifies, and dispatches a
//!   webhook delivery, returning a JSON summary of per-handler outcomes
//! - `GET /health` - Returns 200 if the server is running
//! - `GET /status` - Returns configuration echo and dispatch statistics

use std::sync::Arc;

pub mod status;
pub mod webhook;

pub use status::{health_handler, status_handler};
pub use webhook::webhook_handler;

use crate::config::Config;
use crate::dispatch::EventDispatcher;
use crate::limiter::RateLimiter;
use crate::plugins::PluginManager;

/// Shared application state, passed to all handlers via axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    limiter: RateLimiter,
    dispatcher: Arc<EventDispatcher>,
    plugins: Arc<PluginManager>,
}

impl AppState {
    pub fn new(
        config: Config,
        dispatcher: Arc<EventDispatcher>,
        plugins: Arc<PluginManager>,
    ) -> Self {
        let limiter = RateLimiter::new(
            config.rate_limit,
            std::time::Duration::from_secs(config.rate_window_secs),
        );
        AppState {
            inner: Arc::new(AppStateInner {
                config,
                limiter,
                dispatcher,
                plugins,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The webhook secret as bytes; `None` when no secret is configured,
    /// in which case every delivery is rejected.
    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.inner.config.secret_bytes()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.inner.plugins
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(app_state)
}
