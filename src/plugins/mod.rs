//! The plugin system: capability traits, discovery, loading, and dispatch.
//!
//! Plugins are compiled-in implementations registered through a factory
//! registry (see [`loader`]); discovery scans configured search paths for
//! manifests and plugin sources and resolves each candidate against that
//! registry. The [`manager`] composes loader output with a capability
//! registry and offers broadcast dispatch for PR events and notifications
//! and pipeline dispatch for comment filtering.
//!
//! # Capabilities
//!
//! One trait per capability, instead of probing untyped objects for
//! optional methods: a plugin implements the traits it supports and
//! exposes them through the typed accessors on [`Plugin`]. The capability
//! registry stores plugin references and consults the accessor at
//! dispatch.

pub mod builtin;
pub mod context;
pub mod loader;
pub mod manager;
pub mod metadata;

pub use context::PluginContext;
pub use loader::{DiscoveredPlugin, LoadedPlugin, PluginLoader, PluginRegistry, PluginSource};
pub use manager::{PluginInfo, PluginManager, PluginOutcome};
pub use metadata::{Capability, MetadataError, PluginMetadata};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::events::WebhookEvent;

/// Errors surfaced by plugin construction, lifecycle, and dispatch.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Construction or loading failed.
    #[error("load failed: {0}")]
    Load(String),

    /// `initialize` failed; the plugin is excluded from dispatch.
    #[error("initialization failed: {0}")]
    Init(String),

    /// A declared dependency is not loaded.
    #[error("unsatisfied dependency: {0}")]
    MissingDependency(String),

    /// The plugin does not implement a health check.
    #[error("health check not supported")]
    HealthCheckUnsupported,

    /// Any other plugin-reported failure.
    #[error("{0}")]
    Failed(String),
}

/// A notification to broadcast through notification-capable plugins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    /// Extra key/value context passed through to plugins untouched.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Notification {
        Notification {
            title: title.into(),
            message: message.into(),
            repo: None,
            pr_number: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn with_pr_number(mut self, pr_number: u64) -> Self {
        self.pr_number = Some(pr_number);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Health status for one plugin, as reported by
/// [`manager::PluginManager::get_plugin_health`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handles pull-request events. Broadcast: every enabled plugin with this
/// capability sees every PR event.
#[async_trait]
pub trait PrEventHandler: Send + Sync {
    async fn handle_pr_event(&self, event: &WebhookEvent) -> Result<serde_json::Value, PluginError>;
}

/// Delivers notifications. Broadcast.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), PluginError>;
}

/// Transforms a comment list. Pipeline: each filter consumes the previous
/// filter's output, so the result depends on plugin registration order.
#[async_trait]
pub trait CommentFilter: Send + Sync {
    async fn filter_comments(
        &self,
        comments: &[serde_json::Value],
        criteria: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, PluginError>;
}

/// Receives every classified webhook event. Broadcast.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    async fn handle_webhook(&self, event: &WebhookEvent) -> Result<serde_json::Value, PluginError>;
}

/// The base contract every plugin implements.
///
/// Lifecycle: constructed once by its factory at load, `initialize`d as a
/// distinct step, `shutdown` once at manager teardown. The typed
/// capability accessors default to `None`; a plugin overrides the ones
/// matching its declared capabilities.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// One-time setup after loading. An error marks the plugin failed and
    /// excludes it from dispatch; other plugins are unaffected.
    async fn initialize(&self) -> Result<(), PluginError>;

    /// Best-effort cleanup at manager teardown.
    async fn shutdown(&self) -> Result<(), PluginError>;

    /// Optional health probe. The default reports the check as
    /// unsupported, which the manager turns into an unhealthy report with
    /// an error field.
    async fn health_check(&self) -> Result<(), PluginError> {
        Err(PluginError::HealthCheckUnsupported)
    }

    fn pr_event_handler(&self) -> Option<&dyn PrEventHandler> {
        None
    }

    fn notifier(&self) -> Option<&dyn Notifier> {
        None
    }

    fn comment_filter(&self) -> Option<&dyn CommentFilter> {
        None
    }

    fn webhook_handler(&self) -> Option<&dyn WebhookEventHandler> {
        None
    }
}
