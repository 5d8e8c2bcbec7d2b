//! Plugin metadata and capability declarations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// A behavioral contract a plugin may implement.
///
/// The set is extensible; these are the capabilities the engine itself
/// dispatches on. Wire names are stable and appear in health/info output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Receives pull-request events (broadcast).
    PrEvent,
    /// Delivers user-facing notifications (broadcast).
    Notification,
    /// Transforms comment lists (sequential pipeline).
    CommentFilter,
    /// Receives every classified webhook event (broadcast).
    WebhookHandler,
}

impl Capability {
    /// The stable string form used in health and info output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::PrEvent => "pr_event",
            Capability::Notification => "notification",
            Capability::CommentFilter => "comment_filter",
            Capability::WebhookHandler => "webhook_handler",
        }
    }

    /// All capabilities the engine dispatches on.
    pub fn all() -> [Capability; 4] {
        [
            Capability::PrEvent,
            Capability::Notification,
            Capability::CommentFilter,
            Capability::WebhookHandler,
        ]
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata validation failures.
///
/// Surfaced at load time; a plugin with invalid metadata never finishes
/// loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("plugin name is empty")]
    EmptyName,

    #[error("invalid plugin name {0:?}: only alphanumerics, '-' and '_' are allowed")]
    InvalidName(String),

    #[error("plugin version is empty")]
    EmptyVersion,
}

/// Identity and declarations for one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique identifier; validated against `[A-Za-z0-9_-]+`.
    pub name: String,

    pub version: String,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// The capabilities this plugin declares. Dispatch consults these to
    /// build the capability registry.
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,

    /// Names of other plugins this one requires to be loaded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl PluginMetadata {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> PluginMetadata {
        PluginMetadata {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            author: None,
            capabilities: BTreeSet::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Validates identifier requirements.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.is_empty() {
            return Err(MetadataError::EmptyName);
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(MetadataError::InvalidName(self.name.clone()));
        }
        if self.version.is_empty() {
            return Err(MetadataError::EmptyVersion);
        }
        Ok(())
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
