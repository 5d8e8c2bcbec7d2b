//! Webhook payload authentication.
//!
//! Signature verification (HMAC-SHA256) for inbound deliveries. This is
//! the first gate in the ingestion pipeline; payloads that fail it are
//! rejected before any parsing or dispatch.

pub mod signature;

pub use signature::{decode_signature_header, sign_payload, verify_signature};
