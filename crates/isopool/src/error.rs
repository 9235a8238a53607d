//! Error types for pool operations.

use thiserror::Error;

use crate::task::TaskId;
use crate::worker::ContextId;

/// Result type alias for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Error types for pool operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The unit of work reported a failure for this specific payload.
    /// The hosting context is unaffected and stays in service.
    #[error("task {task_id} failed: {message}")]
    TaskFailed { task_id: TaskId, message: String },

    /// The context executing the task crashed. Every task it held is
    /// rejected with this error and the context is replaced.
    #[error("worker context {context_id} faulted: {cause}")]
    ContextFault { context_id: ContextId, cause: String },

    /// The pool was terminated while the task was still outstanding.
    #[error("pool terminated")]
    Terminated,

    /// The task was submitted after `terminate` and was never queued.
    #[error("submitted to a terminated pool")]
    SubmitAfterTerminate,
}
