//! GitHub webhook ingestion and pluggable event dispatch.
//!
//! This library receives GitHub webhook deliveries over HTTP, verifies
//! their signatures, rate-limits callers, classifies payloads into typed
//! events, and fans them out to registered handlers and capability-based
//! plugins.

pub mod config;
pub mod dispatch;
pub mod events;
pub mod limiter;
pub mod plugins;
pub mod server;
pub mod types;
pub mod webhooks;
