//! Task identity and the result handle returned at submission time.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{PoolError, PoolResult};

/// Unique identifier for a submitted task.
///
/// Allocated from a monotonic counter and never reused for the lifetime of
/// the pool. Replies from worker contexts can arrive in any order; the task
/// id is the only correlation between a reply and the caller's handle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// The job envelope that crosses the context boundary.
///
/// Ownership of the payload moves into the channel; no reference to
/// pool-owned state travels with it.
#[derive(Debug)]
pub(crate) struct Job<P> {
    pub task_id: TaskId,
    pub payload: P,
}

/// Handle to the eventual result of a submitted task.
///
/// Settles exactly once: fulfilled with the worker's output, or rejected
/// with a [`PoolError`]. Dropping the handle detaches the caller but does
/// not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<R> {
    id: TaskId,
    rx: oneshot::Receiver<PoolResult<R>>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<PoolResult<R>>) -> Self {
        Self { id, rx }
    }

    /// Id assigned to the task at submission time.
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = PoolResult<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(settled)) => Poll::Ready(settled),
            // Sender dropped without settling: only possible when the pool
            // actor was torn down before this task was rejected explicitly.
            Poll::Ready(Err(_)) => Poll::Ready(Err(PoolError::Terminated)),
            Poll::Pending => Poll::Pending,
        }
    }
}
