//! Typed webhook events and classification.
//!
//! Inbound deliveries carry their kind in the `X-GitHub-Event` header as a
//! plain string. Classification maps that string onto [`EventKind`];
//! anything unrecognized becomes [`EventKind::Other`] rather than an error,
//! so a new event type on GitHub's side never breaks ingestion.
//!
//! A [`WebhookEvent`] is built once per accepted request and is immutable
//! from then on: dispatch consumes it synchronously and it is discarded
//! with the response. Nothing here persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::DeliveryId;

/// The kinds of webhook events the engine distinguishes.
///
/// Everything else is folded into [`EventKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PullRequest,
    Issue,
    IssueComment,
    PullRequestReview,
    PullRequestReviewComment,
    Push,
    Release,
    WorkflowRun,
    Other,
}

impl EventKind {
    /// Classifies an event-type header value.
    ///
    /// Pure and total: unrecognized values map to [`EventKind::Other`].
    ///
    /// # Examples
    ///
    /// ```
    /// use gh_pr_review::events::EventKind;
    ///
    /// assert_eq!(EventKind::classify("pull_request"), EventKind::PullRequest);
    /// assert_eq!(EventKind::classify("issues"), EventKind::Issue);
    /// assert_eq!(EventKind::classify("totally_unknown"), EventKind::Other);
    /// ```
    pub fn classify(event_type: &str) -> EventKind {
        match event_type {
            "pull_request" => EventKind::PullRequest,
            "issues" => EventKind::Issue,
            "issue_comment" => EventKind::IssueComment,
            "pull_request_review" => EventKind::PullRequestReview,
            "pull_request_review_comment" => EventKind::PullRequestReviewComment,
            "push" => EventKind::Push,
            "release" => EventKind::Release,
            "workflow_run" => EventKind::WorkflowRun,
            _ => EventKind::Other,
        }
    }

    /// The stable wire name for this kind, matching GitHub's header values.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PullRequest => "pull_request",
            EventKind::Issue => "issues",
            EventKind::IssueComment => "issue_comment",
            EventKind::PullRequestReview => "pull_request_review",
            EventKind::PullRequestReviewComment => "pull_request_review_comment",
            EventKind::Push => "push",
            EventKind::Release => "release",
            EventKind::WorkflowRun => "workflow_run",
            EventKind::Other => "other",
        }
    }

    /// Returns true for the pull-request family of events.
    pub fn is_pr_kind(&self) -> bool {
        matches!(
            self,
            EventKind::PullRequest
                | EventKind::PullRequestReview
                | EventKind::PullRequestReviewComment
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified webhook delivery.
///
/// Immutable once built; constructed by the endpoint after signature and
/// rate-limit checks pass, then handed to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    kind: EventKind,
    action: Option<String>,
    payload: serde_json::Value,
    delivery_id: DeliveryId,
    received_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Builds an event from the raw event-type header and parsed payload.
    ///
    /// The `action` field is lifted out of the payload when present; the
    /// payload itself stays opaque to the engine.
    pub fn new(
        event_type: &str,
        delivery_id: DeliveryId,
        payload: serde_json::Value,
    ) -> WebhookEvent {
        let action = payload
            .get("action")
            .and_then(|a| a.as_str())
            .map(|a| a.to_string());

        WebhookEvent {
            kind: EventKind::classify(event_type),
            action,
            payload,
            delivery_id,
            received_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn delivery_id(&self) -> &DeliveryId {
        &self.delivery_id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Returns true if this is a pull-request-related event.
    pub fn is_pr_event(&self) -> bool {
        self.kind.is_pr_kind()
    }

    /// The `pull_request` object from the payload, if any.
    pub fn pull_request(&self) -> Option<&serde_json::Value> {
        self.payload.get("pull_request")
    }

    /// The `repository` object from the payload, if any.
    pub fn repository(&self) -> Option<&serde_json::Value> {
        self.payload.get("repository")
    }

    /// The `sender` (acting user) object from the payload, if any.
    pub fn sender(&self) -> Option<&serde_json::Value> {
        self.payload.get("sender")
    }

    /// The `review` object from the payload, if any.
    pub fn review(&self) -> Option<&serde_json::Value> {
        self.payload.get("review")
    }

    /// The `comment` object from the payload, if any.
    pub fn comment(&self) -> Option<&serde_json::Value> {
        self.payload.get("comment")
    }
}
