//! In-memory TTL cache store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::models::{Fingerprint, ReviewReport};

use super::{CacheError, ResultCache};

struct CacheEntry {
    report: ReviewReport,
    expires_at: Instant,
}

/// Process-local cache implementation.
///
/// Suitable for a single serving instance; a deployment spanning
/// multiple instances replaces this with a shared store behind the
/// same trait.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up at an explicit instant. Exposed for deterministic tests.
    pub fn get_at(&self, fingerprint: &Fingerprint, now: Instant) -> Option<ReviewReport> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(fingerprint.as_str()) {
            Some(entry) if now < entry.expires_at => Some(entry.report.clone()),
            Some(_) => {
                // Expired; drop it so the map does not accumulate dead entries.
                entries.remove(fingerprint.as_str());
                None
            }
            None => None,
        }
    }

    /// Store at an explicit instant. Exposed for deterministic tests.
    pub fn put_at(
        &self,
        fingerprint: &Fingerprint,
        report: &ReviewReport,
        ttl: Duration,
        now: Instant,
    ) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            fingerprint.as_str().to_string(),
            CacheEntry {
                report: report.clone(),
                expires_at: now + ttl,
            },
        );
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ReviewReport>, CacheError> {
        Ok(self.get_at(fingerprint, Instant::now()))
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        report: &ReviewReport,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.put_at(fingerprint, report, ttl, Instant::now());
        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), CacheError> {
        self.entries.lock().unwrap().remove(fingerprint.as_str());
        Ok(())
    }
}
