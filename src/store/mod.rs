//! Durable task state with centrally enforced lifecycle transitions.
//!
//! Callers never flip task states themselves: every change goes through
//! [`TaskStore::transition`], which rejects anything
//! [`TaskState::can_transition_to`] does not allow. The store only
//! guarantees per-record atomicity of a transition; mutual exclusion of
//! task execution belongs to the queue.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Fingerprint, ReviewReport, ReviewRequest, Task, TaskError, TaskId, TaskState};

pub use memory::MemoryStore;

/// Errors from the task store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// A caller asked for a state change the lifecycle does not allow.
    /// This is a programming invariant violation, not an expected
    /// runtime condition.
    #[error("invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskState,
        to: TaskState,
    },

    /// The backing store could not record the change. Fatal to the
    /// operation: task state that is not durably recorded is lost.
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("task store invariant violated: {0}")]
    Internal(String),
}

/// Data accompanying a state transition.
#[derive(Debug, Clone)]
pub enum TransitionPayload {
    /// No payload; used for `Processing`.
    None,
    /// The aggregated result; required for `Completed`.
    Result(ReviewReport),
    /// The classified failure; required for `Failed`.
    Error(TaskError),
}

/// Map from task id to task state and metadata.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Allocate a new task in `Pending`.
    async fn create(
        &self,
        request: ReviewRequest,
        fingerprint: Fingerprint,
    ) -> Result<Task, StoreError>;

    /// Move a task to `new_state`, applying the payload.
    ///
    /// A transition to `Processing` increments the attempt count.
    /// Returns the updated task.
    async fn transition(
        &self,
        id: TaskId,
        new_state: TaskState,
        payload: TransitionPayload,
    ) -> Result<Task, StoreError>;

    /// Fetch a task by id.
    async fn get(&self, id: TaskId) -> Result<Task, StoreError>;
}
