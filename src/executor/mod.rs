//! Worker pool that drains the queue and executes review attempts.
//!
//! Each delivery runs one attempt: fetch the PR files, fan the files
//! out to the analyzer under a concurrency cap, and aggregate the
//! issues into a report. Failures are classified as transient or
//! fatal. Transient failures are re-enqueued with exponential backoff
//! until the attempt budget runs out; fatal failures settle the task
//! immediately. Only a fully completed attempt writes the cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::analyzer::{self, Analyzer, AnalyzerError};
use crate::cache::ResultCache;
use crate::constants;
use crate::host::{HostError, RepoHost};
use crate::models::{Issue, ReviewReport, Task, TaskError, TaskErrorKind, TaskState};
use crate::queue::{Delivery, TaskQueue};
use crate::store::{TaskStore, TransitionPayload};

/// Tunables for attempt execution and the retry policy.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Attempt budget per task. The first execution counts as attempt 1.
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles on each subsequent one.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Per-file analyzer call timeout.
    pub analyze_timeout: Duration,
    /// Concurrent analyzer calls per attempt.
    pub max_concurrent_files: usize,
    /// TTL for cached completed reports.
    pub cache_ttl: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            initial_backoff: constants::DEFAULT_INITIAL_BACKOFF,
            max_backoff: constants::DEFAULT_MAX_BACKOFF,
            analyze_timeout: constants::DEFAULT_ANALYZE_TIMEOUT,
            max_concurrent_files: constants::DEFAULT_MAX_CONCURRENT_FILES,
            cache_ttl: constants::DEFAULT_CACHE_TTL,
        }
    }
}

/// How one attempt failed.
#[derive(Debug)]
enum AttemptError {
    /// Worth retrying: upstream flakiness, timeouts, rate limits.
    Transient(String),
    /// Retrying cannot help; the task fails with this classification.
    Fatal(TaskError),
}

impl From<HostError> for AttemptError {
    fn from(err: HostError) -> Self {
        if err.is_retryable() {
            return AttemptError::Transient(err.to_string());
        }
        let kind = match &err {
            HostError::Auth(_) => TaskErrorKind::Auth,
            HostError::NotFound(_) => TaskErrorKind::NotFound,
            HostError::InvalidRepoUrl(_) => TaskErrorKind::Internal,
            HostError::Api(_) => unreachable!("retryable handled above"),
        };
        AttemptError::Fatal(TaskError::new(kind, err.to_string()))
    }
}

impl From<AnalyzerError> for AttemptError {
    fn from(err: AnalyzerError) -> Self {
        if analyzer::is_retryable(&err) {
            AttemptError::Transient(err.to_string())
        } else {
            AttemptError::Fatal(TaskError::new(TaskErrorKind::Analyzer, err.to_string()))
        }
    }
}

/// Executes deliveries against the analyzer and records outcomes.
pub struct Executor {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    cache: Arc<dyn ResultCache>,
    host: Arc<dyn RepoHost>,
    analyzer: Arc<dyn Analyzer>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn TaskQueue>,
        cache: Arc<dyn ResultCache>,
        host: Arc<dyn RepoHost>,
        analyzer: Arc<dyn Analyzer>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            queue,
            cache,
            host,
            analyzer,
            config,
        }
    }

    /// Spawn `workers` receive loops onto the runtime.
    ///
    /// The loops end when the queue is closed and drained; await the
    /// returned set to join them.
    pub fn spawn(self: &Arc<Self>, workers: usize) -> JoinSet<()> {
        let mut set = JoinSet::new();
        for worker in 0..workers {
            let executor = Arc::clone(self);
            set.spawn(async move {
                debug!(worker, "worker started");
                while let Some(delivery) = executor.queue.recv().await {
                    executor.process(delivery).await;
                }
                debug!(worker, "worker stopped");
            });
        }
        set
    }

    /// Handle one delivery end to end, acking it regardless of outcome.
    ///
    /// Redeliveries of settled tasks are dropped here, which is what
    /// makes at-least-once delivery safe above an idempotent store.
    pub async fn process(&self, delivery: Delivery) {
        let task_id = delivery.task_id;

        let task = match self.store.get(task_id).await {
            Ok(task) => task,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "delivery for unknown task dropped");
                self.ack(delivery).await;
                return;
            }
        };
        if task.state.is_terminal() {
            debug!(task_id = %task_id, state = %task.state, "dropping redelivery of settled task");
            self.ack(delivery).await;
            return;
        }

        // Marks the attempt start and bumps the attempt counter.
        let task = match self
            .store
            .transition(task_id, TaskState::Processing, TransitionPayload::None)
            .await
        {
            Ok(task) => task,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "could not start attempt");
                self.ack(delivery).await;
                return;
            }
        };
        info!(task_id = %task_id, attempt = task.attempt_count, "attempt started");

        match self.run_attempt(&task).await {
            Ok(report) => self.settle_completed(&task, report).await,
            Err(AttemptError::Fatal(task_error)) => {
                warn!(task_id = %task_id, error = %task_error, "attempt failed fatally");
                self.settle_failed(task_id, task_error).await;
            }
            Err(AttemptError::Transient(message)) => self.retry_or_fail(&task, message).await,
        }

        self.ack(delivery).await;
    }

    /// Run one full attempt: fetch files, analyze them, aggregate.
    async fn run_attempt(&self, task: &Task) -> Result<ReviewReport, AttemptError> {
        let request = &task.request;
        let files = self
            .host
            .fetch_pr_files(&request.repo_url, request.pr_number, request.credential.as_deref())
            .await?;

        if files.is_empty() {
            debug!(task_id = %task.id, "PR has no reviewable files");
            return Ok(ReviewReport::new(0, Vec::new()));
        }

        let total_files = files.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_files));
        let mut set: JoinSet<(usize, Result<Vec<Issue>, AttemptError>)> = JoinSet::new();

        for (index, file) in files.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let analyzer = Arc::clone(&self.analyzer);
            let timeout = self.config.analyze_timeout;
            set.spawn(async move {
                // Semaphore is never closed while permits are acquired.
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let path = file.path.clone();
                let outcome = match tokio::time::timeout(timeout, analyzer.analyze(&file)).await {
                    Ok(Ok(issues)) => Ok(issues),
                    Ok(Err(e)) => Err(AttemptError::from(e)),
                    Err(_) => Err(AttemptError::Transient(format!(
                        "analysis of {path} timed out after {}s",
                        timeout.as_secs()
                    ))),
                };
                (index, outcome)
            });
        }

        let mut per_file: Vec<(usize, Vec<Issue>)> = Vec::with_capacity(total_files);
        let mut failure: Option<AttemptError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(issues))) => per_file.push((index, issues)),
                Ok((_, Err(e))) => {
                    // One failed file fails the whole attempt; a partial
                    // report must never be recorded as completed. Keep
                    // draining so remaining calls finish or cancel cleanly.
                    failure.get_or_insert(e);
                    set.abort_all();
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    failure.get_or_insert(AttemptError::Fatal(TaskError::new(
                        TaskErrorKind::Internal,
                        format!("analysis task panicked: {join_err}"),
                    )));
                }
            }
        }
        if let Some(failure) = failure {
            return Err(failure);
        }

        per_file.sort_by_key(|(index, _)| *index);
        let issues: Vec<Issue> = per_file.into_iter().flat_map(|(_, issues)| issues).collect();
        Ok(ReviewReport::new(total_files, issues))
    }

    async fn settle_completed(&self, task: &Task, report: ReviewReport) {
        match self
            .store
            .transition(task.id, TaskState::Completed, TransitionPayload::Result(report.clone()))
            .await
        {
            Ok(_) => {
                info!(task_id = %task.id, issues = report.summary.total_issues, "task completed");
                // Best effort; a cache write failure costs a future
                // re-analysis, not this result.
                if let Err(e) = self
                    .cache
                    .put(&task.fingerprint, &report, self.config.cache_ttl)
                    .await
                {
                    warn!(task_id = %task.id, error = %e, "result cache write failed");
                }
            }
            Err(e) => error!(task_id = %task.id, error = %e, "could not record completion"),
        }
    }

    async fn settle_failed(&self, task_id: crate::models::TaskId, task_error: TaskError) {
        if let Err(e) = self
            .store
            .transition(task_id, TaskState::Failed, TransitionPayload::Error(task_error))
            .await
        {
            error!(task_id = %task_id, error = %e, "could not record failure");
        }
    }

    /// Re-enqueue a transiently failed task, or settle it as failed
    /// once the attempt budget is spent.
    async fn retry_or_fail(&self, task: &Task, message: String) {
        if task.attempt_count >= self.config.max_attempts {
            warn!(task_id = %task.id, attempts = task.attempt_count, error = %message,
                "retry budget exhausted");
            self.settle_failed(
                task.id,
                TaskError::new(
                    TaskErrorKind::RetriesExhausted,
                    format!(
                        "failed after {} attempts, last error: {message}",
                        task.attempt_count
                    ),
                ),
            )
            .await;
            return;
        }

        let delay = retry_backoff(
            task.attempt_count,
            self.config.initial_backoff,
            self.config.max_backoff,
        );
        info!(task_id = %task.id, attempt = task.attempt_count,
            delay_ms = delay.as_millis() as u64, error = %message, "transient failure, will retry");
        if let Err(e) = self.queue.enqueue_after(task.id, delay).await {
            error!(task_id = %task.id, error = %e, "could not re-enqueue for retry");
            self.settle_failed(
                task.id,
                TaskError::new(TaskErrorKind::Internal, format!("re-enqueue failed: {e}")),
            )
            .await;
        }
    }

    async fn ack(&self, delivery: Delivery) {
        let task_id = delivery.task_id;
        if let Err(e) = self.queue.ack(delivery).await {
            warn!(task_id = %task_id, error = %e, "ack failed");
        }
    }
}

/// Delay before the retry that follows `failed_attempts` failures.
///
/// Doubles from `initial` per failed attempt, capped at `max`.
pub fn retry_backoff(failed_attempts: u32, initial: Duration, max: Duration) -> Duration {
    let exponent = failed_attempts.saturating_sub(1).min(16);
    initial.saturating_mul(1u32 << exponent).min(max)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::{MemoryCache, ResultCache};
    use crate::models::{PrFile, ReviewRequest, Severity, TaskId};
    use crate::queue::MemoryQueue;
    use crate::store::MemoryStore;

    struct FixedHost {
        files: Vec<PrFile>,
        error: Option<fn() -> HostError>,
    }

    impl FixedHost {
        fn with_files(files: Vec<PrFile>) -> Self {
            Self { files, error: None }
        }

        fn failing(error: fn() -> HostError) -> Self {
            Self {
                files: vec![],
                error: Some(error),
            }
        }
    }

    #[async_trait]
    impl RepoHost for FixedHost {
        async fn resolve_head(
            &self,
            _repo_url: &str,
            _pr_number: u64,
            _credential: Option<&str>,
        ) -> Result<Option<String>, HostError> {
            Ok(Some("head000".into()))
        }

        async fn fetch_pr_files(
            &self,
            _repo_url: &str,
            _pr_number: u64,
            _credential: Option<&str>,
        ) -> Result<Vec<PrFile>, HostError> {
            if let Some(make_error) = self.error {
                return Err(make_error());
            }
            Ok(self.files.clone())
        }
    }

    enum MockBehavior {
        Issues(Vec<Issue>),
        AlwaysTransient,
        /// Fails the first `n` calls transiently, then succeeds.
        TransientThenOk(u32),
        Fatal,
    }

    struct MockAnalyzer {
        behavior: MockBehavior,
        calls: AtomicU32,
    }

    impl MockAnalyzer {
        fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Analyzer for MockAnalyzer {
        async fn analyze(&self, file: &PrFile) -> Result<Vec<Issue>, AnalyzerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                MockBehavior::Issues(issues) => {
                    let mut issues = issues.clone();
                    for issue in &mut issues {
                        issue.file = file.path.clone();
                    }
                    Ok(issues)
                }
                MockBehavior::AlwaysTransient => {
                    Err(AnalyzerError::ApiError("HTTP 503 service unavailable".into()))
                }
                MockBehavior::TransientThenOk(n) => {
                    if call < *n {
                        Err(AnalyzerError::ApiError("HTTP 429 rate limit".into()))
                    } else {
                        Ok(vec![])
                    }
                }
                MockBehavior::Fatal => {
                    Err(AnalyzerError::ParseError("not json at all".into()))
                }
            }
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
        cache: Arc<MemoryCache>,
        executor: Executor,
    }

    fn fixture(host: FixedHost, analyzer: MockAnalyzer) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let cache = Arc::new(MemoryCache::new());
        let executor = Executor::new(
            store.clone(),
            queue.clone(),
            cache.clone(),
            Arc::new(host),
            Arc::new(analyzer),
            ExecutorConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(8),
                analyze_timeout: Duration::from_secs(5),
                max_concurrent_files: 2,
                cache_ttl: Duration::from_secs(3600),
            },
        );
        Fixture {
            store,
            queue,
            cache,
            executor,
        }
    }

    async fn enqueue_task(f: &Fixture) -> TaskId {
        let request = ReviewRequest::new("https://github.com/acme/widgets", 7);
        let fingerprint = request.fingerprint(Some("head000"));
        let task = f.store.create(request, fingerprint).await.unwrap();
        f.queue.enqueue(task.id).await.unwrap();
        task.id
    }

    /// Drive deliveries through the executor until the task settles.
    async fn run_to_settlement(f: &Fixture, task_id: TaskId) -> Task {
        loop {
            let delivery = tokio::time::timeout(Duration::from_secs(5), f.queue.recv())
                .await
                .expect("queue went quiet before the task settled")
                .unwrap();
            f.executor.process(delivery).await;
            let task = f.store.get(task_id).await.unwrap();
            if task.state.is_terminal() {
                return task;
            }
        }
    }

    fn sample_issue() -> Issue {
        Issue {
            file: String::new(),
            line: 3,
            severity: Severity::Warning,
            kind: "style".into(),
            description: "naming".into(),
            suggestion: None,
        }
    }

    #[tokio::test]
    async fn successful_attempt_completes_and_caches() {
        let f = fixture(
            FixedHost::with_files(vec![
                PrFile::new("src/a.rs", "fn a() {}"),
                PrFile::new("src/b.rs", "fn b() {}"),
            ]),
            MockAnalyzer::new(MockBehavior::Issues(vec![sample_issue()])),
        );
        let task_id = enqueue_task(&f).await;

        let task = run_to_settlement(&f, task_id).await;
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.attempt_count, 1);
        let report = task.result.unwrap();
        assert_eq!(report.summary.total_files, 2);
        assert_eq!(report.summary.total_issues, 2);

        let cached = f.cache.get(&task.fingerprint).await.unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn issues_keep_file_order() {
        let f = fixture(
            FixedHost::with_files(vec![
                PrFile::new("src/z.rs", "fn z() {}"),
                PrFile::new("src/a.rs", "fn a() {}"),
            ]),
            MockAnalyzer::new(MockBehavior::Issues(vec![sample_issue()])),
        );
        let task_id = enqueue_task(&f).await;

        let task = run_to_settlement(&f, task_id).await;
        let report = task.result.unwrap();
        // Issues come back in PR file order, not alphabetical or
        // completion order.
        assert_eq!(report.issues[0].file, "src/z.rs");
        assert_eq!(report.issues[1].file, "src/a.rs");
    }

    #[tokio::test]
    async fn transient_failures_retry_then_exhaust() {
        let f = fixture(
            FixedHost::with_files(vec![PrFile::new("src/a.rs", "fn a() {}")]),
            MockAnalyzer::new(MockBehavior::AlwaysTransient),
        );
        let task_id = enqueue_task(&f).await;

        let task = run_to_settlement(&f, task_id).await;
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.attempt_count, 3);
        let error = task.error.unwrap();
        assert_eq!(error.kind, TaskErrorKind::RetriesExhausted);
        assert!(error.message.contains("3 attempts"));
    }

    #[tokio::test]
    async fn transient_failure_then_success_completes() {
        let f = fixture(
            FixedHost::with_files(vec![PrFile::new("src/a.rs", "fn a() {}")]),
            MockAnalyzer::new(MockBehavior::TransientThenOk(1)),
        );
        let task_id = enqueue_task(&f).await;

        let task = run_to_settlement(&f, task_id).await;
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.attempt_count, 2);
    }

    #[tokio::test]
    async fn non_retriable_failure_settles_on_first_attempt() {
        let f = fixture(
            FixedHost::with_files(vec![PrFile::new("src/a.rs", "fn a() {}")]),
            MockAnalyzer::new(MockBehavior::Fatal),
        );
        let task_id = enqueue_task(&f).await;

        let task = run_to_settlement(&f, task_id).await;
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.attempt_count, 1);
        assert_eq!(task.error.unwrap().kind, TaskErrorKind::Analyzer);
    }

    #[tokio::test]
    async fn failed_task_is_never_cached() {
        let f = fixture(
            FixedHost::with_files(vec![PrFile::new("src/a.rs", "fn a() {}")]),
            MockAnalyzer::new(MockBehavior::AlwaysTransient),
        );
        let task_id = enqueue_task(&f).await;

        let task = run_to_settlement(&f, task_id).await;
        assert_eq!(task.state, TaskState::Failed);
        assert!(f.cache.get(&task.fingerprint).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn auth_host_error_fails_without_retry() {
        let f = fixture(
            FixedHost::failing(|| HostError::Auth("HTTP 401".into())),
            MockAnalyzer::new(MockBehavior::Issues(vec![])),
        );
        let task_id = enqueue_task(&f).await;

        let task = run_to_settlement(&f, task_id).await;
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.attempt_count, 1);
        assert_eq!(task.error.unwrap().kind, TaskErrorKind::Auth);
    }

    #[tokio::test]
    async fn empty_pr_completes_with_empty_report() {
        let f = fixture(
            FixedHost::with_files(vec![]),
            MockAnalyzer::new(MockBehavior::Issues(vec![sample_issue()])),
        );
        let task_id = enqueue_task(&f).await;

        let task = run_to_settlement(&f, task_id).await;
        assert_eq!(task.state, TaskState::Completed);
        let report = task.result.unwrap();
        assert_eq!(report.summary.total_files, 0);
        assert_eq!(report.summary.total_issues, 0);
    }

    #[tokio::test]
    async fn redelivery_of_settled_task_is_dropped() {
        let f = fixture(
            FixedHost::with_files(vec![PrFile::new("src/a.rs", "fn a() {}")]),
            MockAnalyzer::new(MockBehavior::Issues(vec![]))
        );
        let task_id = enqueue_task(&f).await;
        let settled = run_to_settlement(&f, task_id).await;

        // Simulate at-least-once redelivery after settlement.
        f.queue.enqueue(task_id).await.unwrap();
        let delivery = f.queue.recv().await.unwrap();
        f.executor.process(delivery).await;

        let task = f.store.get(task_id).await.unwrap();
        assert_eq!(task.state, settled.state);
        assert_eq!(task.attempt_count, settled.attempt_count);
        assert_eq!(task.updated_at, settled.updated_at);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let initial = Duration::from_secs(10);
        let max = Duration::from_secs(120);
        assert_eq!(retry_backoff(1, initial, max), Duration::from_secs(10));
        assert_eq!(retry_backoff(2, initial, max), Duration::from_secs(20));
        assert_eq!(retry_backoff(3, initial, max), Duration::from_secs(40));
        assert_eq!(retry_backoff(4, initial, max), Duration::from_secs(80));
        assert_eq!(retry_backoff(5, initial, max), Duration::from_secs(120));
        assert_eq!(retry_backoff(50, initial, max), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn worker_pool_drains_queue_and_stops_on_close() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let cache = Arc::new(MemoryCache::new());
        let executor = Arc::new(Executor::new(
            store.clone(),
            queue.clone(),
            cache,
            Arc::new(FixedHost::with_files(vec![PrFile::new("src/a.rs", "fn a() {}")])),
            Arc::new(MockAnalyzer::new(MockBehavior::Issues(vec![]))),
            ExecutorConfig::default(),
        ));

        let mut ids = Vec::new();
        for pr in 1..=4u64 {
            let request = ReviewRequest::new("https://github.com/acme/widgets", pr);
            let fingerprint = request.fingerprint(None);
            let task = store.create(request, fingerprint).await.unwrap();
            queue.enqueue(task.id).await.unwrap();
            ids.push(task.id);
        }

        let mut workers = executor.spawn(2);
        queue.close();
        while workers.join_next().await.is_some() {}

        for id in ids {
            let task = store.get(id).await.unwrap();
            assert_eq!(task.state, TaskState::Completed);
        }
    }
}
