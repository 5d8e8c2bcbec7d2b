//! Newtype wrappers for identifiers used across the webhook engine.
//!
//! These types prevent accidental mixing of different identifier kinds
//! (e.g., using a plugin identifier where a delivery identifier is expected)
//! and make signatures self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The delivery identifier supplied by the webhook sender.
///
/// GitHub sends this in the `X-GitHub-Delivery` header. It is used purely
/// as a correlation key in logs and dispatch summaries; deliveries with a
/// missing header get an empty identifier rather than being rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(s: impl Into<String>) -> Self {
        DeliveryId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeliveryId {
    fn from(s: String) -> Self {
        DeliveryId(s)
    }
}

impl From<&str> for DeliveryId {
    fn from(s: &str) -> Self {
        DeliveryId(s.to_string())
    }
}

/// An opaque token identifying a single handler registration.
///
/// Returned by [`crate::dispatch::EventDispatcher::register`]; required to
/// unregister the handler later. Ids are unique per dispatcher instance and
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}
