//! Idempotent result cache keyed by review fingerprint.
//!
//! A completed review is stored against its fingerprint with a TTL so
//! an identical re-submission is answered without dispatching work.
//! The cache is best-effort: a failing backend degrades to "no cache"
//! and never fails the request that touched it.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Fingerprint, ReviewReport};

pub use memory::MemoryCache;

/// Errors from the cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store could not be reached.
    #[error("result cache unavailable: {0}")]
    Unavailable(String),
}

/// Fingerprint-keyed store for completed review results.
///
/// Written only by the executor after a task reaches `completed`;
/// partial or failed runs are never cached.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up a cached result. Expired entries read as a miss.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ReviewReport>, CacheError>;

    /// Store a result, unconditionally overwriting any existing entry.
    async fn put(
        &self,
        fingerprint: &Fingerprint,
        report: &ReviewReport,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Remove an entry, forcing the next submission to re-analyze.
    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), CacheError>;
}
