//! Submission intake: validate, dedup, admit, enqueue.
//!
//! The dispatcher is the only write path into the system. For each
//! submission it runs a fixed pipeline: validate the request shape,
//! answer from the result cache when possible, consult the rate
//! limiter, then create the task and enqueue it. A cache hit is served
//! before the limiter is consulted, so repeat submissions of finished
//! work never consume admission budget.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, ResultCache};
use crate::host::RepoHost;
use crate::limiter::{Decision, LimiterError, RateLimiter};
use crate::models::{ReviewReport, ReviewRequest, TaskHandle, ValidationError};
use crate::queue::{QueueError, TaskQueue};
use crate::store::{StoreError, TaskStore};

/// Errors from submission intake.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// What a submission resolved to.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// A task was created and enqueued.
    Accepted(TaskHandle),
    /// A fresh cached result answered the request; no task was created.
    Cached(ReviewReport),
    /// The client is over its rate limit.
    Denied { retry_after: std::time::Duration },
}

/// Front door for review submissions.
pub struct Dispatcher {
    limiter: Arc<dyn RateLimiter>,
    cache: Arc<dyn ResultCache>,
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    host: Arc<dyn RepoHost>,
}

impl Dispatcher {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        cache: Arc<dyn ResultCache>,
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn TaskQueue>,
        host: Arc<dyn RepoHost>,
    ) -> Self {
        Self {
            limiter,
            cache,
            store,
            queue,
            host,
        }
    }

    /// Submit a review request on behalf of `client_id`.
    ///
    /// With `force` set, any cached result for the request is
    /// invalidated and a fresh task is dispatched.
    pub async fn submit(
        &self,
        request: ReviewRequest,
        client_id: &str,
        force: bool,
    ) -> Result<SubmitOutcome, DispatchError> {
        request.validate()?;

        // Pin the fingerprint to the PR head when the host can tell us.
        // Without it identical resubmissions of an updated PR would read
        // a stale cached review, so the degradation is logged.
        let head_sha = match self
            .host
            .resolve_head(&request.repo_url, request.pr_number, request.credential.as_deref())
            .await
        {
            Ok(sha) => sha,
            Err(e) => {
                warn!(repo = %request.repo_url, pr = request.pr_number, error = %e,
                    "could not resolve PR head; fingerprint will not be commit-pinned");
                None
            }
        };
        if head_sha.is_none() {
            warn!(repo = %request.repo_url, pr = request.pr_number,
                "fingerprint keyed on repo and PR number only; cached results may lag the PR head");
        }
        let fingerprint = request.fingerprint(head_sha.as_deref());

        if force {
            if let Err(e) = self.cache.invalidate(&fingerprint).await {
                warn!(fingerprint = %fingerprint, error = %e, "cache invalidation failed");
            }
        } else if let Some(report) = self.cached(&fingerprint).await {
            info!(fingerprint = %fingerprint, "answered from result cache");
            return Ok(SubmitOutcome::Cached(report));
        }

        match self.limiter.check(client_id).await? {
            Decision::Allowed => {}
            Decision::Denied { retry_after } => {
                debug!(client = client_id, retry_after_secs = retry_after.as_secs(),
                    "submission rate limited");
                return Ok(SubmitOutcome::Denied { retry_after });
            }
        }

        let task = self.store.create(request, fingerprint).await?;
        self.queue.enqueue(task.id).await?;
        info!(task_id = %task.id, fingerprint = %task.fingerprint, "task enqueued");

        Ok(SubmitOutcome::Accepted(TaskHandle {
            task_id: task.id,
            state: task.state,
        }))
    }

    /// Cache lookup that degrades to a miss when the backend fails.
    async fn cached(&self, fingerprint: &crate::models::Fingerprint) -> Option<ReviewReport> {
        match self.cache.get(fingerprint).await {
            Ok(hit) => hit,
            Err(CacheError::Unavailable(msg)) => {
                warn!(fingerprint = %fingerprint, error = %msg,
                    "result cache unavailable; treating as miss");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::host::HostError;
    use crate::limiter::SlidingWindowLimiter;
    use crate::models::{PrFile, TaskState};
    use crate::queue::MemoryQueue;
    use crate::store::MemoryStore;

    struct StaticHost {
        head: Option<String>,
    }

    #[async_trait]
    impl RepoHost for StaticHost {
        async fn resolve_head(
            &self,
            _repo_url: &str,
            _pr_number: u64,
            _credential: Option<&str>,
        ) -> Result<Option<String>, HostError> {
            Ok(self.head.clone())
        }

        async fn fetch_pr_files(
            &self,
            _repo_url: &str,
            _pr_number: u64,
            _credential: Option<&str>,
        ) -> Result<Vec<PrFile>, HostError> {
            Ok(vec![])
        }
    }

    fn dispatcher(limit: u32) -> (Dispatcher, Arc<MemoryQueue>, Arc<MemoryCache>) {
        let queue = Arc::new(MemoryQueue::new());
        let cache = Arc::new(MemoryCache::new());
        let dispatcher = Dispatcher::new(
            Arc::new(SlidingWindowLimiter::new(limit, Duration::from_secs(60))),
            cache.clone(),
            Arc::new(MemoryStore::new()),
            queue.clone(),
            Arc::new(StaticHost {
                head: Some("abc123".into()),
            }),
        );
        (dispatcher, queue, cache)
    }

    fn request() -> ReviewRequest {
        ReviewRequest::new("https://github.com/acme/widgets", 42)
    }

    #[tokio::test]
    async fn accepted_submission_creates_pending_task_and_enqueues() {
        let (dispatcher, queue, _) = dispatcher(10);

        let outcome = dispatcher.submit(request(), "alice", false).await.unwrap();
        let handle = match outcome {
            SubmitOutcome::Accepted(handle) => handle,
            other => panic!("expected Accepted, got {other:?}"),
        };
        assert_eq!(handle.state, TaskState::Pending);

        let delivery = queue.recv().await.unwrap();
        assert_eq!(delivery.task_id, handle.task_id);
    }

    #[tokio::test]
    async fn invalid_request_rejected_before_limiter() {
        let (dispatcher, _, _) = dispatcher(1);

        let bad = ReviewRequest::new("not a url", 1);
        assert!(matches!(
            dispatcher.submit(bad, "alice", false).await,
            Err(DispatchError::Validation(_))
        ));

        // The failed submission consumed no budget.
        assert!(matches!(
            dispatcher.submit(request(), "alice", false).await.unwrap(),
            SubmitOutcome::Accepted(_)
        ));
    }

    #[tokio::test]
    async fn over_limit_client_is_denied_with_retry_hint() {
        let (dispatcher, _, _) = dispatcher(2);

        for _ in 0..2 {
            let outcome = dispatcher.submit(request(), "alice", false).await.unwrap();
            assert!(matches!(outcome, SubmitOutcome::Accepted(_)));
        }

        match dispatcher.submit(request(), "alice", false).await.unwrap() {
            SubmitOutcome::Denied { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
                assert!(retry_after > Duration::ZERO);
            }
            other => panic!("expected Denied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cache_hit_bypasses_rate_limiter() {
        let (dispatcher, _, cache) = dispatcher(0);

        let fingerprint = request().fingerprint(Some("abc123"));
        let report = ReviewReport::new(1, vec![]);
        cache
            .put(&fingerprint, &report, Duration::from_secs(3600))
            .await
            .unwrap();

        // Limit is zero, so only the cache can answer this.
        match dispatcher.submit(request(), "alice", false).await.unwrap() {
            SubmitOutcome::Cached(hit) => assert_eq!(hit.summary.total_files, 1),
            other => panic!("expected Cached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn force_invalidates_cache_and_redispatches() {
        let (dispatcher, _, cache) = dispatcher(10);

        let fingerprint = request().fingerprint(Some("abc123"));
        cache
            .put(&fingerprint, &ReviewReport::new(1, vec![]), Duration::from_secs(3600))
            .await
            .unwrap();

        let outcome = dispatcher.submit(request(), "alice", true).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Accepted(_)));
        assert!(cache.get(&fingerprint).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unresolvable_head_still_dispatches() {
        let queue = Arc::new(MemoryQueue::new());
        let dispatcher = Dispatcher::new(
            Arc::new(SlidingWindowLimiter::new(10, Duration::from_secs(60))),
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryStore::new()),
            queue.clone(),
            Arc::new(StaticHost { head: None }),
        );

        let outcome = dispatcher.submit(request(), "alice", false).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Accepted(_)));
    }
}
