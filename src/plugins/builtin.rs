//! Built-in plugins, available without any external plugin directories.
//!
//! `pr-logger` logs a human-readable line for PR activity and records
//! notifications it receives. `spam-filter` drops comments whose body
//! matches configured patterns.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use tracing::info;

use crate::events::{EventKind, WebhookEvent};

use super::context::PluginContext;
use super::loader::PluginRegistry;
use super::metadata::{Capability, PluginMetadata};
use super::{CommentFilter, Notification, Notifier, Plugin, PluginError, PrEventHandler};

/// Registers the built-in plugins on a registry.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register("pr-logger", |_ctx| Ok(Box::new(PrLoggerPlugin::new())));
    registry.register("spam-filter", |ctx| Ok(Box::new(SpamFilterPlugin::new(&ctx))));
}

/// Logs PR activity and keeps a bounded record of notifications.
pub struct PrLoggerPlugin {
    metadata: PluginMetadata,
    notifications: Mutex<Vec<Notification>>,
}

const NOTIFICATION_LOG_CAP: usize = 100;

impl PrLoggerPlugin {
    pub fn new() -> PrLoggerPlugin {
        PrLoggerPlugin {
            metadata: PluginMetadata::new("pr-logger", "1.0.0", "Logs pull request activity")
                .with_capability(Capability::PrEvent)
                .with_capability(Capability::Notification),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// The notifications recorded so far, oldest first.
    pub fn recorded_notifications(&self) -> Vec<Notification> {
        self.notifications.lock().expect("notification log poisoned").clone()
    }
}

impl Default for PrLoggerPlugin {
    fn default() -> Self {
        PrLoggerPlugin::new()
    }
}

/// Builds a one-line activity message for a PR-related event, or None
/// when the payload carries no pull request.
fn format_pr_message(event: &WebhookEvent) -> Option<String> {
    let pr = event.pull_request()?;
    let pr_number = pr.get("number").and_then(|n| n.as_u64());
    let number = pr_number.map_or_else(|| "?".to_string(), |n| n.to_string());

    let headline = match event.kind() {
        EventKind::PullRequest => match event.action() {
            Some("opened") => {
                let author = login_of(event.sender());
                format!("New PR #{number} opened by {author}")
            }
            Some("closed") => {
                if pr.get("merged").and_then(|m| m.as_bool()).unwrap_or(false) {
                    format!("PR #{number} merged")
                } else {
                    format!("PR #{number} closed without merge")
                }
            }
            Some("reopened") => format!("PR #{number} reopened"),
            Some("ready_for_review") => format!("PR #{number} ready for review"),
            Some(action) => format!("PR #{number} {action}"),
            None => format!("PR #{number}"),
        },
        EventKind::PullRequestReview => {
            let review = event.review()?;
            let state = review.get("state").and_then(|s| s.as_str()).unwrap_or("unknown");
            let reviewer = login_of(review.get("user"));
            match state {
                "approved" => format!("PR #{number} approved by {reviewer}"),
                "changes_requested" => {
                    format!("Changes requested on PR #{number} by {reviewer}")
                }
                _ => format!("Review comment on PR #{number} by {reviewer}"),
            }
        }
        EventKind::PullRequestReviewComment => {
            let comment = event.comment()?;
            let commenter = login_of(comment.get("user"));
            format!("New review comment on PR #{number} by {commenter}")
        }
        _ => return None,
    };

    let title = pr.get("title").and_then(|t| t.as_str()).unwrap_or("No title");
    let repo = event
        .repository()
        .and_then(|r| r.get("full_name"))
        .and_then(|n| n.as_str())
        .unwrap_or("Unknown");

    Some(format!("{headline} \"{title}\" in {repo}"))
}

fn login_of(user: Option<&serde_json::Value>) -> &str {
    user.and_then(|u| u.get("login"))
        .and_then(|l| l.as_str())
        .unwrap_or("Unknown")
}

#[async_trait]
impl Plugin for PrLoggerPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn pr_event_handler(&self) -> Option<&dyn PrEventHandler> {
        Some(self)
    }

    fn notifier(&self) -> Option<&dyn Notifier> {
        Some(self)
    }
}

#[async_trait]
impl PrEventHandler for PrLoggerPlugin {
    async fn handle_pr_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<serde_json::Value, PluginError> {
        let message = format_pr_message(event);
        if let Some(message) = &message {
            info!(delivery = %event.delivery_id(), "{message}");
        }
        Ok(json!({
            "event_type": event.kind().as_str(),
            "action": event.action(),
            "message": message,
        }))
    }
}

#[async_trait]
impl Notifier for PrLoggerPlugin {
    async fn notify(&self, notification: &Notification) -> Result<(), PluginError> {
        info!(
            title = %notification.title,
            message = %notification.message,
            "notification"
        );
        let mut log = self.notifications.lock().expect("notification log poisoned");
        if log.len() >= NOTIFICATION_LOG_CAP {
            log.remove(0);
        }
        log.push(notification.clone());
        Ok(())
    }
}

/// Drops comments whose body matches any configured pattern, and
/// optionally comments shorter than a `min_body_len` criterion.
pub struct SpamFilterPlugin {
    metadata: PluginMetadata,
    patterns: Vec<String>,
}

const DEFAULT_SPAM_PATTERNS: &[&str] = &["+1", "bump", "any update"];

impl SpamFilterPlugin {
    /// Reads the pattern list from the `spam-filter` plugin options;
    /// falls back to a small default set.
    pub fn new(context: &PluginContext) -> SpamFilterPlugin {
        let patterns = context
            .plugin_option("spam-filter", "patterns")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_else(|| {
                DEFAULT_SPAM_PATTERNS.iter().map(|p| p.to_string()).collect()
            });

        SpamFilterPlugin {
            metadata: PluginMetadata::new("spam-filter", "1.0.0", "Drops low-signal comments")
                .with_capability(Capability::CommentFilter),
            patterns,
        }
    }

    fn is_spam(&self, body: &str) -> bool {
        let lowered = body.to_lowercase();
        let trimmed = lowered.trim();
        self.patterns.iter().any(|p| {
            trimmed == p.as_str()
                || (trimmed.contains(p.as_str()) && trimmed.len() <= p.len() + 10)
        })
    }
}

#[async_trait]
impl Plugin for SpamFilterPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn comment_filter(&self) -> Option<&dyn CommentFilter> {
        Some(self)
    }
}

#[async_trait]
impl CommentFilter for SpamFilterPlugin {
    async fn filter_comments(
        &self,
        comments: &[serde_json::Value],
        criteria: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, PluginError> {
        let min_body_len = criteria
            .get("min_body_len")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;

        Ok(comments
            .iter()
            .filter(|comment| {
                let body = comment.get("body").and_then(|b| b.as_str()).unwrap_or("");
                body.trim().len() >= min_body_len && !self.is_spam(body)
            })
            .cloned()
            .collect())
    }
}
