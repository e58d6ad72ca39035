//! Task queue collaborator interface.
//!
//! The queue provides at-least-once delivery with acknowledgment and is
//! the mutual-exclusion point for task execution: a delivery hands one
//! worker the right to run the task until it is acked. Durability of
//! queued-but-not-yet-executed tasks is the broker's responsibility.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::TaskId;

pub use memory::MemoryQueue;

/// Errors from the queue backend.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue has been closed; no further work is accepted.
    #[error("task queue is closed")]
    Closed,

    /// The broker could not be reached.
    #[error("task queue unavailable: {0}")]
    Unavailable(String),
}

/// A received message. Holding a delivery means owning the task's
/// active execution until [`TaskQueue::ack`].
#[derive(Debug)]
pub struct Delivery {
    pub task_id: TaskId,
}

/// Enqueue/dequeue with at-least-once semantics.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task for execution.
    async fn enqueue(&self, task_id: TaskId) -> Result<(), QueueError>;

    /// Enqueue a task after `delay` (retry backoff).
    async fn enqueue_after(&self, task_id: TaskId, delay: Duration) -> Result<(), QueueError>;

    /// Wait for the next delivery. Returns `None` once the queue is
    /// closed and drained.
    async fn recv(&self) -> Option<Delivery>;

    /// Acknowledge a delivery, releasing ownership of the task.
    async fn ack(&self, delivery: Delivery) -> Result<(), QueueError>;

    /// Stop accepting new work. In-flight and already queued deliveries
    /// still drain.
    fn close(&self);
}
