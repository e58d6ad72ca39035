//! In-process channel-backed queue.
//!
//! Single-process stand-in for an external broker. Delivery is
//! effectively exactly-once here (an unacked delivery is not redelivered
//! after a crash, since a crash takes the process with it); the executor
//! still follows the at-least-once discipline so a real broker can slot
//! in behind the trait.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::TaskId;

use super::{Delivery, QueueError, TaskQueue};

/// Unbounded in-process task queue.
pub struct MemoryQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<TaskId>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<TaskId>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: tokio::sync::Mutex::new(rx),
        }
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<TaskId>, QueueError> {
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .cloned()
            .ok_or(QueueError::Closed)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task_id: TaskId) -> Result<(), QueueError> {
        self.sender()?.send(task_id).map_err(|_| QueueError::Closed)
    }

    async fn enqueue_after(&self, task_id: TaskId, delay: Duration) -> Result<(), QueueError> {
        let sender = self.sender()?;
        debug!(task_id = %task_id, delay_ms = delay.as_millis() as u64, "delayed enqueue");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means shutdown; dropping the task id is fine then.
            let _ = sender.send(task_id);
        });
        Ok(())
    }

    async fn recv(&self) -> Option<Delivery> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.map(|task_id| Delivery { task_id })
    }

    async fn ack(&self, _delivery: Delivery) -> Result<(), QueueError> {
        // Nothing to do: the channel already removed the message on recv.
        Ok(())
    }

    fn close(&self) {
        self.sender.lock().unwrap().take();
    }
}
