//! Execution contexts: isolated workers that run one unit of work at a time.
//!
//! A context owns its `Work` instance outright. The only exchange with the
//! pool is the job envelope going in and a reply (or fault report) coming
//! back out, so pool bookkeeping and running work never share mutable state.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;
use uuid::Uuid;

use crate::task::{Job, TaskId};

/// The unit of work loaded into every context.
///
/// One instance runs per context and receives payloads one at a time.
/// Returning `Err` from [`Work::run`] is a deliberate, task-scoped failure:
/// only that task's handle is rejected and the context stays in service.
/// A panic inside `run` is a context-level fault: the context is discarded
/// and replaced, and every task it was holding is rejected.
#[async_trait]
pub trait Work: Send + 'static {
    /// Input moved across the context boundary on dispatch.
    type Payload: Send + 'static;
    /// Output moved back across the boundary on completion.
    type Output: Send + 'static;
    /// Task-scoped failure reported back to the submitting caller.
    type Error: fmt::Display + Send + 'static;

    async fn run(&mut self, payload: Self::Payload) -> Result<Self::Output, Self::Error>;
}

/// Identity of one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Reply posted by a context after running one job.
#[derive(Debug)]
pub(crate) enum WorkerReply<R> {
    Done {
        context_id: ContextId,
        task_id: TaskId,
        value: R,
    },
    Failed {
        context_id: ContextId,
        task_id: TaskId,
        message: String,
    },
}

/// Everything a context sends up to the pool mailbox.
#[derive(Debug)]
pub(crate) enum ContextEvent<R> {
    Reply(WorkerReply<R>),
    Down { context_id: ContextId, cause: String },
}

/// One isolated execution context, owned exclusively by the pool.
///
/// The run loop lives on its own tokio task; a separate monitor task awaits
/// the loop's join handle and reports a panic to the pool as a context
/// fault. The job channel has capacity 1: a context never holds a second
/// message before replying to the first.
pub(crate) struct WorkerContext<W: Work> {
    pub id: ContextId,
    pub spawned_at: DateTime<Utc>,
    jobs: mpsc::Sender<Job<W::Payload>>,
    abort: AbortHandle,
}

impl<W: Work> WorkerContext<W> {
    /// Spawn a fresh context running `work`, wired to the pool's event
    /// channel for replies and fault reports.
    pub fn spawn(work: W, events: mpsc::UnboundedSender<ContextEvent<W::Output>>) -> Self {
        let id = ContextId::new();
        let (job_tx, job_rx) = mpsc::channel(1);
        let run_handle = tokio::spawn(run_loop(id, work, job_rx, events.clone()));
        let abort = run_handle.abort_handle();
        tokio::spawn(monitor(id, run_handle, events));
        Self {
            id,
            spawned_at: Utc::now(),
            jobs: job_tx,
            abort,
        }
    }

    /// Hand exactly one job to the context.
    ///
    /// Fails only when the run loop is gone (the context crashed before the
    /// pool noticed); the job is returned so the caller can requeue it.
    pub fn try_dispatch(&self, job: Job<W::Payload>) -> Result<(), Job<W::Payload>> {
        self.jobs.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(job) => job,
            mpsc::error::TrySendError::Closed(job) => job,
        })
    }

    /// Tear the context down, abandoning any in-flight job.
    pub fn shutdown(&self) {
        self.abort.abort();
    }
}

async fn run_loop<W: Work>(
    id: ContextId,
    mut work: W,
    mut jobs: mpsc::Receiver<Job<W::Payload>>,
    events: mpsc::UnboundedSender<ContextEvent<W::Output>>,
) {
    while let Some(job) = jobs.recv().await {
        let task_id = job.task_id;
        let reply = match work.run(job.payload).await {
            Ok(value) => WorkerReply::Done {
                context_id: id,
                task_id,
                value,
            },
            Err(err) => WorkerReply::Failed {
                context_id: id,
                task_id,
                message: err.to_string(),
            },
        };
        if events.send(ContextEvent::Reply(reply)).is_err() {
            // Pool is gone; nothing left to report to.
            return;
        }
    }
    debug!(context = %id, "worker context shut down");
}

/// Await the run loop and surface an abnormal exit as a context fault.
///
/// A clean exit (job channel closed during shutdown) reports nothing.
async fn monitor<R>(
    id: ContextId,
    run_handle: JoinHandle<()>,
    events: mpsc::UnboundedSender<ContextEvent<R>>,
) {
    if let Err(err) = run_handle.await {
        let cause = if err.is_panic() {
            let payload = err.into_panic();
            if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "worker panicked".to_string()
            }
        } else {
            "worker task aborted".to_string()
        };
        // Send failure means the pool already shut down; the fault is moot.
        let _ = events.send(ContextEvent::Down {
            context_id: id,
            cause,
        });
    }
}
