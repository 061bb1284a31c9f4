// ── Offline retry queue ──
//
// FIFO of type-erased operations deferred while offline. The queue itself
// is dumb storage; the drain policy lives in `RetryCoordinator`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A re-runnable deferred action. Arguments are captured by the closure.
pub type QueuedAction = Box<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// An operation waiting for connectivity.
pub struct QueuedOperation {
    action: QueuedAction,
    pub description: String,
    /// Failed drain passes so far.
    pub retry_count: u32,
    pub queued_at: DateTime<Utc>,
}

impl std::fmt::Debug for QueuedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedOperation")
            .field("description", &self.description)
            .field("retry_count", &self.retry_count)
            .field("queued_at", &self.queued_at)
            .finish_non_exhaustive()
    }
}

impl QueuedOperation {
    /// Wrap `action`; its success value is discarded.
    pub fn new<F, Fut, T, E>(description: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            action: Box::new(move || {
                let fut = action();
                Box::pin(async move {
                    fut.await.map(|_| ()).map_err(|e| Box::new(e) as BoxError)
                })
            }),
            description: description.into(),
            retry_count: 0,
            queued_at: Utc::now(),
        }
    }

    /// Attempt the action once.
    pub async fn run(&self) -> Result<(), BoxError> {
        (self.action)().await
    }
}

/// Mutex-guarded FIFO. The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct RetryQueue {
    ops: Mutex<VecDeque<QueuedOperation>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, op: QueuedOperation) {
        self.ops.lock().expect("retry queue lock poisoned").push_back(op);
    }

    pub fn len(&self) -> usize {
        self.ops.lock().expect("retry queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return everything, oldest first.
    pub fn take_all(&self) -> Vec<QueuedOperation> {
        self.ops.lock().expect("retry queue lock poisoned").drain(..).collect()
    }

    /// Discard everything. Returns how many operations were dropped.
    pub fn clear(&self) -> usize {
        let mut ops = self.ops.lock().expect("retry queue lock poisoned");
        let dropped = ops.len();
        ops.clear();
        dropped
    }

    /// Descriptions of queued operations, oldest first.
    pub fn descriptions(&self) -> Vec<String> {
        self.ops
            .lock()
            .expect("retry queue lock poisoned")
            .iter()
            .map(|op| op.description.clone())
            .collect()
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Ran and succeeded; gone from the queue.
    pub succeeded: usize,
    /// Ran and failed; back in the queue for the next pass.
    pub requeued: usize,
    /// Exhausted their drain budget; dropped without running.
    pub dropped: usize,
}

impl DrainReport {
    /// Operations actually run in this pass.
    pub fn attempted(&self) -> usize {
        self.succeeded + self.requeued
    }
}
