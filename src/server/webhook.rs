//! Webhook endpoint handler.
//!
//! Sequences each inbound delivery: verify the signature, check the rate
//! limit, parse the body, classify the event, dispatch, and return a JSON
//! summary of per-handler and per-plugin outcomes. No business logic
//! lives here beyond this sequencing.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::dispatch::HandlerOutcome;
use crate::events::WebhookEvent;
use crate::plugins::PluginOutcome;
use crate::types::DeliveryId;
use crate::webhooks::verify_signature;

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";
/// Header consulted for the rate-limit identity when present.
const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

/// Errors that terminate a webhook delivery before dispatch.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Signature verification failed, or no signature was supplied.
    #[error("invalid signature")]
    InvalidSignature,

    /// The caller exceeded its admission window.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Invalid JSON body.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// The per-delivery summary returned on success.
#[derive(Debug, Serialize)]
pub struct DeliverySummary {
    pub delivery_id: DeliveryId,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub handlers: Vec<HandlerOutcome>,
    pub plugins: BTreeMap<String, PluginOutcome>,
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Headers:
///   - `X-Hub-Signature-256`: HMAC-SHA256 signature (`sha256=<hex>`)
///   - `X-GitHub-Event`: event type (e.g. "pull_request")
///   - `X-GitHub-Delivery`: delivery ID (optional)
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 OK: JSON summary of per-handler and per-plugin outcomes
/// - 400 Bad Request: missing event header or invalid JSON
/// - 401 Unauthorized: signature verification failed
/// - 429 Too Many Requests: rate limit exceeded
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DeliverySummary>, WebhookError> {
    // Verify the signature before anything else. Unauthenticated traffic
    // must not consume rate-limit quota or parser time. No configured
    // secret means no delivery can be authenticated; verifying against an
    // empty key would let anyone sign with it.
    let Some(secret) = app_state.webhook_secret() else {
        warn!("no webhook secret configured, rejecting delivery");
        return Err(WebhookError::InvalidSignature);
    };
    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !verify_signature(&body, signature, secret) {
        warn!("invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let identity = caller_identity(&headers);
    if !app_state.limiter().admit(&identity) {
        warn!(identity = %identity, "rate limit exceeded");
        return Err(WebhookError::RateLimited);
    }

    let event_type = headers
        .get(HEADER_EVENT)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(HEADER_EVENT))?;
    let delivery_id = DeliveryId::new(
        headers
            .get(HEADER_DELIVERY)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown"),
    );

    let payload: serde_json::Value = serde_json::from_slice(&body)?;
    let event = WebhookEvent::new(event_type, delivery_id.clone(), payload);

    debug!(
        delivery_id = %delivery_id,
        event_kind = %event.kind().as_str(),
        action = event.action().unwrap_or(""),
        "webhook received"
    );

    let handlers = app_state.dispatcher().dispatch(&event).await;

    let mut plugins = app_state.plugins().dispatch_webhook_event(&event).await;
    if event.is_pr_event() {
        plugins.extend(app_state.plugins().dispatch_pr_event(&event).await);
    }

    info!(
        delivery_id = %delivery_id,
        event_kind = %event.kind().as_str(),
        handlers = handlers.len(),
        plugins = plugins.len(),
        "webhook dispatched"
    );

    Ok(Json(DeliverySummary {
        delivery_id,
        kind: event.kind().as_str(),
        action: event.action().map(str::to_string),
        handlers,
        plugins,
    }))
}

/// The rate-limit identity for a request: the first `X-Forwarded-For`
/// hop when running behind a proxy, otherwise a shared direct bucket.
fn caller_identity(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "direct".to_string())
}
