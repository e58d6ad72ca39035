//! Read-only task status and result surface.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::models::{ReviewReport, Task, TaskError, TaskId, TaskState};
use crate::store::{StoreError, TaskStore};

/// Errors from status queries.
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("task {0} not found")]
    UnknownTask(TaskId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for StatusError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => StatusError::UnknownTask(id),
            other => StatusError::Store(other),
        }
    }
}

/// Snapshot of a task's progress, safe to hand to clients.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub attempt_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl From<&Task> for TaskStatus {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            state: task.state,
            attempt_count: task.attempt_count,
            created_at: task.created_at,
            updated_at: task.updated_at,
            error: task.error.clone(),
        }
    }
}

/// Answer to a result query.
#[derive(Debug)]
pub enum ResultQuery {
    /// The task completed; here is the report.
    Ready(ReviewReport),
    /// The task is still pending or processing.
    NotReady { state: TaskState },
    /// The task failed; here is the classification.
    Failed(TaskError),
}

/// Client-facing read path over the task store.
pub struct StatusApi {
    store: Arc<dyn TaskStore>,
}

impl StatusApi {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Current lifecycle snapshot of a task.
    pub async fn status(&self, task_id: TaskId) -> Result<TaskStatus, StatusError> {
        let task = self.store.get(task_id).await?;
        Ok(TaskStatus::from(&task))
    }

    /// The task's result, if it has one yet.
    pub async fn result(&self, task_id: TaskId) -> Result<ResultQuery, StatusError> {
        let task = self.store.get(task_id).await?;
        Ok(match task.state {
            TaskState::Completed => match task.result {
                Some(report) => ResultQuery::Ready(report),
                // A completed task always carries its report; treat the
                // impossible case as a store invariant failure.
                None => {
                    return Err(StatusError::Store(StoreError::Internal(format!(
                        "completed task {task_id} has no result"
                    ))));
                }
            },
            TaskState::Failed => match task.error {
                Some(error) => ResultQuery::Failed(error),
                None => {
                    return Err(StatusError::Store(StoreError::Internal(format!(
                        "failed task {task_id} has no error"
                    ))));
                }
            },
            state => ResultQuery::NotReady { state },
        })
    }
}
