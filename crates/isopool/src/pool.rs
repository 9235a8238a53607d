//! Pool manager: owns the contexts, the pending queue and the in-flight
//! table, and runs the dispatch and fault-recovery logic.
//!
//! All bookkeeping lives inside a single actor task fed by a mailbox, so
//! dispatch, reply handling and fault recovery never interleave. Submission
//! goes through an unbounded sender and never blocks the caller, no matter
//! how saturated the pool is.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::task::{Job, TaskHandle, TaskId};
use crate::worker::{ContextEvent, ContextId, Work, WorkerContext, WorkerReply};

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub concurrency: usize,
    pub free_contexts: usize,
    pub busy_contexts: usize,
    pub pending_tasks: usize,
    pub inflight_tasks: usize,
    pub faults_recovered: u64,
    pub contexts: Vec<ContextInfo>,
}

/// Per-context entry inside [`PoolStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    pub id: ContextId,
    pub busy: bool,
    pub spawned_at: DateTime<Utc>,
}

/// Commands from the handle to the pool actor.
enum Command<W: Work> {
    Submit(Submission<W>),
    Status(oneshot::Sender<PoolStatus>),
    Terminate(oneshot::Sender<()>),
}

/// A queued task: id, payload, and the sender that settles its handle.
struct Submission<W: Work> {
    task_id: TaskId,
    payload: W::Payload,
    reply: oneshot::Sender<PoolResult<W::Output>>,
}

/// Tracking entry for a task that has been handed to a context.
struct Inflight<W: Work> {
    context_id: ContextId,
    reply: oneshot::Sender<PoolResult<W::Output>>,
}

/// A context plus the task currently assigned to it, if any.
struct ContextSlot<W: Work> {
    context: WorkerContext<W>,
    assigned: Option<TaskId>,
}

type WorkFactory<W> = Arc<dyn Fn() -> W + Send + Sync>;

/// A fixed-size pool of isolated worker contexts.
///
/// Tasks are dispatched to free contexts in strict FIFO submission order
/// and may complete in any order. A crashed context is replaced with a
/// fresh one without losing the rest of the pool's work.
pub struct WorkerPool<W: Work> {
    commands: mpsc::UnboundedSender<Command<W>>,
    next_task_id: AtomicU64,
}

impl<W: Work> WorkerPool<W> {
    /// Create a pool with `config.concurrency` free contexts, each loaded
    /// with a fresh `Work` instance from `factory`.
    ///
    /// The factory is also invoked whenever a crashed context is replaced.
    /// Must be called from within a tokio runtime.
    pub fn new<F>(factory: F, config: PoolConfig) -> Self
    where
        F: Fn() -> W + Send + Sync + 'static,
    {
        let concurrency = config.concurrency.max(1);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let actor = PoolActor::new(Arc::new(factory), concurrency);
        tokio::spawn(actor.run(command_rx));
        info!(concurrency, "worker pool started");
        Self {
            commands: command_tx,
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Queue a payload and return its handle immediately.
    ///
    /// Never blocks: when every context is busy the task waits in the FIFO
    /// queue. After [`terminate`](Self::terminate) the returned handle
    /// settles at once with [`PoolError::SubmitAfterTerminate`].
    pub fn submit(&self, payload: W::Payload) -> TaskHandle<W::Output> {
        let task_id = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let (reply_tx, reply_rx) = oneshot::channel();
        let submission = Submission {
            task_id,
            payload,
            reply: reply_tx,
        };
        if let Err(mpsc::error::SendError(command)) = self.commands.send(Command::Submit(submission))
        {
            if let Command::Submit(submission) = command {
                let _ = submission.reply.send(Err(PoolError::SubmitAfterTerminate));
            }
        }
        TaskHandle::new(task_id, reply_rx)
    }

    /// Snapshot of queue depths and per-context state.
    pub async fn status(&self) -> PoolResult<PoolStatus> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Status(tx))
            .map_err(|_| PoolError::Terminated)?;
        rx.await.map_err(|_| PoolError::Terminated)
    }

    /// Shut the pool down.
    ///
    /// Every context is torn down and every pending or in-flight handle
    /// settles with [`PoolError::Terminated`]. Idempotent: repeated calls
    /// are no-ops.
    pub async fn terminate(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Terminate(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

struct PoolActor<W: Work> {
    factory: WorkFactory<W>,
    concurrency: usize,
    contexts: HashMap<ContextId, ContextSlot<W>>,
    free: VecDeque<ContextId>,
    pending: VecDeque<Submission<W>>,
    inflight: HashMap<TaskId, Inflight<W>>,
    faults_recovered: u64,
    events_tx: mpsc::UnboundedSender<ContextEvent<W::Output>>,
    events_rx: mpsc::UnboundedReceiver<ContextEvent<W::Output>>,
}

impl<W: Work> PoolActor<W> {
    fn new(factory: WorkFactory<W>, concurrency: usize) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut contexts = HashMap::with_capacity(concurrency);
        let mut free = VecDeque::with_capacity(concurrency);
        for _ in 0..concurrency {
            let context = WorkerContext::spawn(factory(), events_tx.clone());
            free.push_back(context.id);
            contexts.insert(
                context.id,
                ContextSlot {
                    context,
                    assigned: None,
                },
            );
        }
        Self {
            factory,
            concurrency,
            contexts,
            free,
            pending: VecDeque::new(),
            inflight: HashMap::new(),
            faults_recovered: 0,
            events_tx,
            events_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<W>>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit(submission)) => {
                        debug!(task = %submission.task_id, "task queued");
                        self.pending.push_back(submission);
                        self.dispatch();
                    }
                    Some(Command::Status(tx)) => {
                        let _ = tx.send(self.snapshot());
                    }
                    Some(Command::Terminate(ack)) => {
                        // Close the mailbox before acking so a submit racing
                        // with the terminate caller rejects as
                        // SubmitAfterTerminate, not silently.
                        commands.close();
                        self.shutdown();
                        let _ = ack.send(());
                        return;
                    }
                    // Handle dropped without an explicit terminate.
                    None => {
                        self.shutdown();
                        return;
                    }
                },
                event = self.events_rx.recv() => match event {
                    Some(ContextEvent::Reply(reply)) => self.on_reply(reply),
                    Some(ContextEvent::Down { context_id, cause }) => {
                        self.on_context_down(context_id, cause);
                    }
                    // The actor holds its own events sender, so the channel
                    // never closes while the loop runs.
                    None => {}
                },
            }
        }
    }

    /// Pair queued tasks with free contexts until one side runs out.
    ///
    /// FIFO over the pending queue, no preference among free contexts.
    /// This is the sole mutator of the free/pending/in-flight partition.
    fn dispatch(&mut self) {
        while !self.pending.is_empty() {
            let Some(context_id) = self.free.pop_front() else {
                break;
            };
            let Some(submission) = self.pending.pop_front() else {
                self.free.push_front(context_id);
                break;
            };
            let Some(slot) = self.contexts.get_mut(&context_id) else {
                // Stale free-list entry; drop it and retry the submission.
                self.pending.push_front(submission);
                continue;
            };
            let Submission {
                task_id,
                payload,
                reply,
            } = submission;
            match slot.context.try_dispatch(Job { task_id, payload }) {
                Ok(()) => {
                    slot.assigned = Some(task_id);
                    self.inflight.insert(task_id, Inflight { context_id, reply });
                    debug!(task = %task_id, context = %context_id, "task dispatched");
                }
                Err(job) => {
                    // The context died before its monitor reported it.
                    // Requeue the task and replace the context right away.
                    self.pending.push_front(Submission {
                        task_id: job.task_id,
                        payload: job.payload,
                        reply,
                    });
                    self.replace_context(context_id, "job channel closed".to_string());
                }
            }
        }
    }

    fn on_reply(&mut self, reply: WorkerReply<W::Output>) {
        let (context_id, task_id, outcome) = match reply {
            WorkerReply::Done {
                context_id,
                task_id,
                value,
            } => (context_id, task_id, Ok(value)),
            WorkerReply::Failed {
                context_id,
                task_id,
                message,
            } => {
                debug!(task = %task_id, context = %context_id, %message, "task failed in worker");
                (
                    context_id,
                    task_id,
                    Err(PoolError::TaskFailed { task_id, message }),
                )
            }
        };
        if let Some(inflight) = self.inflight.remove(&task_id) {
            // Best-effort: the caller may have dropped the handle.
            let _ = inflight.reply.send(outcome);
        }
        if let Some(slot) = self.contexts.get_mut(&context_id) {
            if slot.assigned == Some(task_id) {
                slot.assigned = None;
                self.free.push_back(context_id);
            }
        }
        self.dispatch();
    }

    fn on_context_down(&mut self, context_id: ContextId, cause: String) {
        // Already replaced (dispatch noticed the dead channel first) or
        // torn down by terminate.
        if !self.contexts.contains_key(&context_id) {
            return;
        }
        warn!(context = %context_id, %cause, "worker context faulted");
        self.replace_context(context_id, cause);
        self.dispatch();
    }

    /// Discard a faulted context, reject every task it held, and register
    /// a fresh replacement so `free + busy` returns to `concurrency`
    /// before the next mailbox message is processed.
    fn replace_context(&mut self, context_id: ContextId, cause: String) {
        let Some(slot) = self.contexts.remove(&context_id) else {
            return;
        };
        self.free.retain(|id| *id != context_id);
        slot.context.shutdown();

        let orphaned: Vec<TaskId> = self
            .inflight
            .iter()
            .filter(|(_, inflight)| inflight.context_id == context_id)
            .map(|(task_id, _)| *task_id)
            .collect();
        for task_id in orphaned {
            if let Some(inflight) = self.inflight.remove(&task_id) {
                let _ = inflight.reply.send(Err(PoolError::ContextFault {
                    context_id,
                    cause: cause.clone(),
                }));
            }
        }

        let replacement = WorkerContext::spawn((self.factory)(), self.events_tx.clone());
        debug!(old = %context_id, new = %replacement.id, "replacement context registered");
        self.free.push_back(replacement.id);
        self.contexts.insert(
            replacement.id,
            ContextSlot {
                context: replacement,
                assigned: None,
            },
        );
        self.faults_recovered += 1;
    }

    fn shutdown(&mut self) {
        info!(
            pending = self.pending.len(),
            inflight = self.inflight.len(),
            "terminating worker pool"
        );
        for (_, slot) in self.contexts.drain() {
            slot.context.shutdown();
        }
        self.free.clear();
        for submission in self.pending.drain(..) {
            let _ = submission.reply.send(Err(PoolError::Terminated));
        }
        for (_, inflight) in self.inflight.drain() {
            let _ = inflight.reply.send(Err(PoolError::Terminated));
        }
    }

    fn snapshot(&self) -> PoolStatus {
        let busy = self
            .contexts
            .values()
            .filter(|slot| slot.assigned.is_some())
            .count();
        PoolStatus {
            concurrency: self.concurrency,
            free_contexts: self.free.len(),
            busy_contexts: busy,
            pending_tasks: self.pending.len(),
            inflight_tasks: self.inflight.len(),
            faults_recovered: self.faults_recovered,
            contexts: self
                .contexts
                .values()
                .map(|slot| ContextInfo {
                    id: slot.context.id,
                    busy: slot.assigned.is_some(),
                    spawned_at: slot.context.spawned_at,
                })
                .collect(),
        }
    }
}
