//! In-memory task store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{Fingerprint, ReviewRequest, Task, TaskId, TaskState};

use super::{StoreError, TaskStore, TransitionPayload};

/// Process-local task store.
///
/// Each transition mutates one record under the map lock, which gives
/// the per-record atomicity the lifecycle needs. Tasks are never
/// deleted; retention is an external concern.
#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(
        &self,
        request: ReviewRequest,
        fingerprint: Fingerprint,
    ) -> Result<Task, StoreError> {
        let task = Task::new(request, fingerprint);
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(task)
    }

    async fn transition(
        &self,
        id: TaskId,
        new_state: TaskState,
        payload: TransitionPayload,
    ) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !task.state.can_transition_to(new_state) {
            return Err(StoreError::InvalidTransition {
                id,
                from: task.state,
                to: new_state,
            });
        }

        match (new_state, payload) {
            (TaskState::Processing, TransitionPayload::None) => {
                task.attempt_count += 1;
            }
            (TaskState::Completed, TransitionPayload::Result(report)) => {
                task.result = Some(report);
            }
            (TaskState::Failed, TransitionPayload::Error(error)) => {
                task.error = Some(error);
            }
            (state, payload) => {
                return Err(StoreError::Internal(format!(
                    "transition to {state} with mismatched payload {payload:?}"
                )));
            }
        }

        task.state = new_state;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        self.tasks
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReviewReport, TaskError, TaskErrorKind};

    async fn store_with_task() -> (MemoryStore, TaskId) {
        let store = MemoryStore::new();
        let request = ReviewRequest::new("https://github.com/user/repo", 7);
        let fp = request.fingerprint(None);
        let task = store.create(request, fp).await.unwrap();
        (store, task.id)
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let (store, id) = store_with_task().await;
        let task = store.get(id).await.unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.attempt_count, 0);
    }

    #[tokio::test]
    async fn processing_increments_attempts() {
        let (store, id) = store_with_task().await;
        let task = store
            .transition(id, TaskState::Processing, TransitionPayload::None)
            .await
            .unwrap();
        assert_eq!(task.attempt_count, 1);

        // Redelivery restart bumps the count again.
        let task = store
            .transition(id, TaskState::Processing, TransitionPayload::None)
            .await
            .unwrap();
        assert_eq!(task.attempt_count, 2);
    }

    #[tokio::test]
    async fn completed_records_result() {
        let (store, id) = store_with_task().await;
        store
            .transition(id, TaskState::Processing, TransitionPayload::None)
            .await
            .unwrap();
        let task = store
            .transition(
                id,
                TaskState::Completed,
                TransitionPayload::Result(ReviewReport::new(2, vec![])),
            )
            .await
            .unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.result.unwrap().summary.total_files, 2);
        assert!(task.error.is_none());
    }

    #[tokio::test]
    async fn failed_records_error() {
        let (store, id) = store_with_task().await;
        store
            .transition(id, TaskState::Processing, TransitionPayload::None)
            .await
            .unwrap();
        let task = store
            .transition(
                id,
                TaskState::Failed,
                TransitionPayload::Error(TaskError::new(TaskErrorKind::Auth, "bad credential")),
            )
            .await
            .unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.error.unwrap().kind, TaskErrorKind::Auth);
    }

    #[tokio::test]
    async fn terminal_states_reject_further_transitions() {
        let (store, id) = store_with_task().await;
        store
            .transition(id, TaskState::Processing, TransitionPayload::None)
            .await
            .unwrap();
        store
            .transition(
                id,
                TaskState::Completed,
                TransitionPayload::Result(ReviewReport::new(0, vec![])),
            )
            .await
            .unwrap();

        let err = store
            .transition(id, TaskState::Processing, TransitionPayload::None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        // State is unchanged after the rejected transition.
        assert_eq!(store.get(id).await.unwrap().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn skipping_processing_is_rejected() {
        let (store, id) = store_with_task().await;
        let err = store
            .transition(
                id,
                TaskState::Completed,
                TransitionPayload::Result(ReviewReport::new(0, vec![])),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn mismatched_payload_is_rejected() {
        let (store, id) = store_with_task().await;
        store
            .transition(id, TaskState::Processing, TransitionPayload::None)
            .await
            .unwrap();
        let err = store
            .transition(id, TaskState::Completed, TransitionPayload::None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(TaskId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
