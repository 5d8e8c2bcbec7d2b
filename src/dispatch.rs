//! Event dispatch with per-handler failure isolation.
//!
//! The dispatcher owns the event-kind → handler-list registrations. A
//! dispatch invokes every handler registered for the event's kind, in
//! registration order, and collects one outcome per handler. A handler
//! that fails contributes a structured error outcome; it never aborts the
//! remaining handlers and is not auto-unregistered.
//!
//! Handlers are awaited sequentially for a single delivery, so a stalled
//! handler delays only the response for its own delivery. There is no
//! per-handler timeout and no cancellation once a handler has started.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::events::{EventKind, WebhookEvent};
use crate::types::HandlerId;

/// A boxed future as returned by [`FnHandler`] closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error returned by a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler failed with a message of its own.
    #[error("{0}")]
    Failed(String),

    /// The handler produced a result that could not be serialized.
    #[error("malformed handler result: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An event handler registered with the dispatcher.
///
/// Handlers return an arbitrary JSON value describing what they did; the
/// value is echoed back in the endpoint's outcome summary.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// A short name used in logs and outcome summaries.
    fn name(&self) -> &str;

    /// Processes one event.
    async fn handle(&self, event: &WebhookEvent) -> Result<serde_json::Value, HandlerError>;
}

/// The outcome of one handler invocation.
///
/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerOutcome {
    pub handler: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandlerOutcome {
    fn ok(handler: &str, result: serde_json::Value) -> HandlerOutcome {
        HandlerOutcome {
            handler: handler.to_string(),
            result: Some(result),
            error: None,
        }
    }

    fn err(handler: &str, error: impl ToString) -> HandlerOutcome {
        HandlerOutcome {
            handler: handler.to_string(),
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// Returns true if this outcome records a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Running counters over everything the dispatcher has processed.
///
/// Served by the `/status` endpoint; reset on restart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchStats {
    pub total_events: u64,
    pub events_by_kind: BTreeMap<String, u64>,
    pub handler_errors: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

struct Registration {
    id: HandlerId,
    handler: Arc<dyn EventHandler>,
}

/// Event-kind → handler-list registry and dispatch engine.
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventKind, Vec<Registration>>>,
    stats: Mutex<DispatchStats>,
    next_id: AtomicU64,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> EventDispatcher {
        EventDispatcher {
            handlers: RwLock::new(HashMap::new()),
            stats: Mutex::new(DispatchStats::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a handler for an event kind, appending to the existing
    /// list. Returns the id needed to unregister it later.
    pub fn register(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(kind = %kind, handler = handler.name(), id = %id, "registering handler");

        let mut handlers = self.handlers.write().expect("dispatcher lock poisoned");
        handlers
            .entry(kind)
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Removes a previously registered handler.
    ///
    /// Unregistering an id that is not registered for `kind` is a no-op,
    /// not an error; returns whether anything was removed.
    pub fn unregister(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().expect("dispatcher lock poisoned");
        match handlers.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|r| r.id != id);
                before != list.len()
            }
            None => false,
        }
    }

    /// Invokes every handler registered for the event's kind, in
    /// registration order, isolating failures.
    ///
    /// The returned outcomes mirror registration order exactly; a failing
    /// handler yields an error outcome in its slot.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Vec<HandlerOutcome> {
        // Snapshot the registration list so handlers can register or
        // unregister without deadlocking against an in-flight dispatch.
        let snapshot: Vec<(String, Arc<dyn EventHandler>)> = {
            let handlers = self.handlers.read().expect("dispatcher lock poisoned");
            handlers
                .get(&event.kind())
                .map(|list| {
                    list.iter()
                        .map(|r| (r.handler.name().to_string(), Arc::clone(&r.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut outcomes = Vec::with_capacity(snapshot.len());
        let mut errors = 0u64;

        for (name, handler) in snapshot {
            match handler.handle(event).await {
                Ok(result) => outcomes.push(HandlerOutcome::ok(&name, result)),
                Err(e) => {
                    error!(
                        handler = %name,
                        delivery_id = %event.delivery_id(),
                        error = %e,
                        "handler failed"
                    );
                    errors += 1;
                    outcomes.push(HandlerOutcome::err(&name, e));
                }
            }
        }

        self.record(event, errors);
        outcomes
    }

    fn record(&self, event: &WebhookEvent, errors: u64) {
        let mut stats = self.stats.lock().expect("stats lock poisoned");
        stats.total_events += 1;
        *stats
            .events_by_kind
            .entry(event.kind().as_str().to_string())
            .or_default() += 1;
        stats.handler_errors += errors;
        stats.last_event_at = Some(Utc::now());
    }

    /// A snapshot of the dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().expect("stats lock poisoned").clone()
    }

    /// The number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .expect("dispatcher lock poisoned")
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

/// Adapts an async closure into an [`EventHandler`].
///
/// Convenient for built-in handlers and tests that do not warrant a
/// dedicated type.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: for<'a> Fn(&'a WebhookEvent) -> BoxFuture<'a, Result<serde_json::Value, HandlerError>>
        + Send
        + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> FnHandler<F> {
        FnHandler {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a WebhookEvent) -> BoxFuture<'a, Result<serde_json::Value, HandlerError>>
        + Send
        + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &WebhookEvent) -> Result<serde_json::Value, HandlerError> {
        (self.f)(event).await
    }
}
