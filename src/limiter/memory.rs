//! In-memory sliding-window rate limiter.
//!
//! Tracks, per client, the admission timestamps within the trailing
//! window. A check prunes expired timestamps, admits iff the remaining
//! count is below the limit, and appends the new timestamp on
//! admission, all under one lock acquisition per check.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Decision, LimiterError, RateLimiter};

/// Sliding-window counter keyed by client id.
pub struct SlidingWindowLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting at most `limit` requests per `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check admission at an explicit instant. Exposed for deterministic tests;
    /// production callers go through [`RateLimiter::check`].
    pub fn check_at(&self, client_id: &str, now: Instant) -> Decision {
        let mut windows = self.windows.lock().unwrap();
        let stamps = windows.entry(client_id.to_string()).or_default();

        // Prune admissions that have aged out of the trailing window.
        while let Some(&oldest) = stamps.front() {
            if now.duration_since(oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if (stamps.len() as u32) < self.limit {
            stamps.push_back(now);
            Decision::Allowed
        } else {
            // The slot frees up when the oldest in-window admission expires.
            // An empty window only reaches here with limit == 0; then the
            // full window length is as good a hint as any.
            let retry_after = stamps
                .front()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(self.window);
            Decision::Denied { retry_after }
        }
    }

    /// Drop window state for clients with no admissions inside the window.
    ///
    /// Window state carries no guarantee past `window` of inactivity, so
    /// this can run on any schedule the embedder likes.
    pub fn evict_idle(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        windows.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|&newest| now.duration_since(newest) < self.window)
        });
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(&self, client_id: &str) -> Result<Decision, LimiterError> {
        Ok(self.check_at(client_id, Instant::now()))
    }
}
