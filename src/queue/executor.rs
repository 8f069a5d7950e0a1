//! Bounded execution queue
//!
//! A FIFO of pending jobs plus a `running` counter capped at `concurrency`.
//! [`ExecutionQueue::try_run`] starts jobs while a slot is free and runs
//! whenever a job is enqueued or a running job settles, so a freed slot is
//! reused straight away.
//!
//! Jobs start in enqueue order; the first `concurrency` of them may finish
//! in any order. A failing job rejects only its own handle.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::config::HeapConfig;
use crate::error::{HeapError, Result};

type PendingJob = BoxFuture<'static, ()>;

/// Snapshot of the scheduler counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub running: usize,
    pub concurrency: usize,
}

struct QueueState {
    pending: VecDeque<PendingJob>,
    running: usize,
}

struct Inner {
    state: Mutex<QueueState>,
    concurrency: usize,
}

/// Concurrency-limited scheduler for async jobs
#[derive(Clone)]
pub struct ExecutionQueue {
    inner: Arc<Inner>,
}

impl ExecutionQueue {
    /// Create a queue running at most `concurrency` jobs at once
    pub fn new(concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: 0,
                }),
                concurrency: concurrency.max(1),
            }),
        }
    }

    pub fn from_config(config: &HeapConfig) -> Self {
        Self::new(config.queue_concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// Queue a job and return a handle that settles with its outcome.
    ///
    /// The job is queued when this is called, not when the handle is first
    /// polled; dropping the handle does not withdraw the job. Must be called
    /// from within a Tokio runtime.
    pub fn enqueue<F, T>(&self, job: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let pending: PendingJob = Box::pin(async move {
            // Receiver may be gone; the job still ran
            let _ = tx.send(job.await);
        });

        self.inner.state.lock().pending.push_back(pending);
        self.try_run();

        async move { rx.await.map_err(|_| HeapError::JobAborted)? }
    }

    /// Start pending jobs while under the concurrency cap. A no-op when the
    /// queue is empty or every slot is taken.
    pub fn try_run(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime; pending jobs stay queued");
            return;
        };

        loop {
            let job = {
                let mut state = self.inner.state.lock();
                if state.running >= self.inner.concurrency {
                    return;
                }
                let Some(job) = state.pending.pop_front() else {
                    return;
                };
                state.running += 1;
                tracing::debug!(
                    running = state.running,
                    queued = state.pending.len(),
                    "job started"
                );
                job
            };

            let slot = RunningSlot {
                queue: self.clone(),
            };
            runtime.spawn(async move {
                job.await;
                drop(slot);
            });
        }
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.inner.state.lock();
        QueueStatus {
            queued: state.pending.len(),
            running: state.running,
            concurrency: self.inner.concurrency,
        }
    }
}

impl std::fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("status", &self.status())
            .finish()
    }
}

/// Holds one concurrency slot. Released when the job settles, including
/// when it panics and its task unwinds.
struct RunningSlot {
    queue: ExecutionQueue,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        {
            let mut state = self.queue.inner.state.lock();
            state.running -= 1;
            tracing::debug!(running = state.running, "job settled");
        }
        self.queue.try_run();
    }
}
