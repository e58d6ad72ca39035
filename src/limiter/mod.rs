//! Admission control for review submissions.
//!
//! The limiter decides whether a new request from a given client may
//! proceed. It sits behind a trait so the in-memory sliding window can
//! be swapped for a shared external store (the check stays a single
//! narrow atomic operation either way) without touching the dispatcher.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::SlidingWindowLimiter;

/// Errors from the rate limiter backend.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// The backing store could not be reached.
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed; its slot has been recorded.
    Allowed,
    /// The client is over its limit.
    Denied {
        /// Time until the oldest in-window admission ages out.
        retry_after: Duration,
    },
}

/// Admission gate keyed by client identity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check and record one request from `client_id`.
    ///
    /// The prune-count-append sequence is atomic per client key: two
    /// concurrent checks for the same client never both observe the
    /// same free slot.
    async fn check(&self, client_id: &str) -> Result<Decision, LimiterError>;
}
