//! Sliding-window rate limiting per caller identity.
//!
//! Each identity gets an ordered list of admission timestamps. On every
//! check the list is pruned of entries older than the window, and the
//! request is admitted iff fewer than `limit` entries remain. State is
//! process-local and resets on restart.
//!
//! The server runs handlers on the multi-threaded tokio runtime, so the
//! per-key map is guarded by a mutex. The critical section is a prune and
//! a push; it never awaits.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window admission control.
///
/// One instance lives for the server lifetime, shared via the application
/// state. Rejected requests are answered with 429 and never reach
/// classification or dispatch.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    admissions: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    /// Creates a limiter admitting at most `limit` requests per identity
    /// within any trailing `window`.
    pub fn new(limit: usize, window: Duration) -> RateLimiter {
        RateLimiter {
            limit,
            window,
            admissions: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether a request from `identity` is admitted right now.
    ///
    /// Admission appends the current timestamp; rejection leaves state
    /// untouched apart from pruning.
    pub fn admit(&self, identity: &str) -> bool {
        self.admit_at(identity, Instant::now())
    }

    /// Admission check at an explicit point in time.
    ///
    /// `now` must be monotonically non-decreasing across calls for a given
    /// identity; `admit` guarantees this by using `Instant::now`. Split out
    /// so tests can exercise window expiry without sleeping.
    fn admit_at(&self, identity: &str, now: Instant) -> bool {
        let mut admissions = self.admissions.lock().expect("rate limiter mutex poisoned");
        let timestamps = admissions.entry(identity.to_string()).or_default();

        // Lazy prune: drop everything that has slid out of the window.
        let cutoff = now.checked_sub(self.window);
        if let Some(cutoff) = cutoff {
            timestamps.retain(|t| *t > cutoff);
        }

        if timestamps.len() >= self.limit {
            return false;
        }

        timestamps.push(now);
        true
    }

    /// The configured per-identity limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The configured window.
    pub fn window(&self) -> Duration {
        self.window
    }
}
