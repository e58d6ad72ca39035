//! Task lifecycle types.
//!
//! A task is the unit of orchestration state: created by the dispatcher,
//! mutated by the executor, read by the status surface. State moves
//! forward only; `completed` and `failed` are terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::issue::ReviewReport;
use super::request::{Fingerprint, ReviewRequest};

/// Newtype for task identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Created, queued for execution.
    Pending,
    /// A worker is executing an attempt.
    Processing,
    /// Finished successfully; result is available. Terminal.
    Completed,
    /// Retry budget exhausted or non-retriable error. Terminal.
    Failed,
}

impl TaskState {
    /// Can transition from self to `to`?
    ///
    /// `Processing -> Processing` is legal: at-least-once queue delivery
    /// can hand an in-flight task to a worker again after a crash, and
    /// re-entry simply restarts the attempt.
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Classification of a terminal task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Credential rejected by the VCS host.
    Auth,
    /// Repository or pull request does not exist.
    NotFound,
    /// Transient failures persisted past the retry budget.
    RetriesExhausted,
    /// Analyzer returned an unusable response.
    Analyzer,
    /// Internal invariant violation.
    Internal,
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskErrorKind::Auth => "auth",
            TaskErrorKind::NotFound => "not_found",
            TaskErrorKind::RetriesExhausted => "retries_exhausted",
            TaskErrorKind::Analyzer => "analyzer",
            TaskErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// Classified error recorded on a failed task.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A unit of orchestration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, assigned at creation, immutable.
    pub id: TaskId,

    /// Dedup/cache fingerprint derived from the request.
    pub fingerprint: Fingerprint,

    /// The request this task executes. Carried so the executor can
    /// recompute the full file set on every attempt.
    pub request: ReviewRequest,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Number of execution attempts so far.
    pub attempt_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Present only when `state == Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ReviewReport>,

    /// Present only when `state == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl Task {
    /// Create a new task in `Pending`.
    pub fn new(request: ReviewRequest, fingerprint: Fingerprint) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            fingerprint,
            request,
            state: TaskState::Pending,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }
}

/// What the dispatcher hands back for an accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: TaskId,
    pub state: TaskState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_legal() {
        use TaskState::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
    }

    #[test]
    fn processing_reentry_is_legal() {
        assert!(TaskState::Processing.can_transition_to(TaskState::Processing));
    }

    #[test]
    fn terminal_states_have_no_successors() {
        use TaskState::*;
        for to in [Pending, Processing, Completed, Failed] {
            assert!(!Completed.can_transition_to(to));
            assert!(!Failed.can_transition_to(to));
        }
    }

    #[test]
    fn backward_transitions_are_illegal() {
        use TaskState::*;
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
    }

    #[test]
    fn is_terminal() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Processing.is_terminal());
    }

    #[test]
    fn new_task_starts_pending() {
        let req = ReviewRequest::new("https://github.com/user/repo", 1);
        let fp = req.fingerprint(None);
        let task = Task::new(req, fp);
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.attempt_count, 0);
        assert!(task.result.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskState::Processing).unwrap(),
            "\"processing\""
        );
    }
}
