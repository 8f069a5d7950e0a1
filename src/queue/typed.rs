//! Typed, persisted jobs on top of [`ExecutionQueue`]
//!
//! A job type names a registered [`JobHandler`]. Enqueueing records the job
//! as `queued`, hands the run to the execution queue and returns the job id
//! at once; progress is read back with [`JobQueue::get_job`] or followed
//! through [`JobQueue::subscribe`].

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::executor::{ExecutionQueue, QueueStatus};
use super::job::{JobFilter, JobStatus, JobTransition, QueueJob};
use super::store::{InMemoryJobStore, JobStore};
use crate::error::{HeapError, Result};

/// Runs the payload of one job type
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, payload: Value) -> Result<Value>;
}

/// Adapter turning an async closure into a [`JobHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn run(&self, payload: Value) -> Result<Value> {
        (self.0)(payload).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Lifecycle notifications for typed jobs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    Queued {
        job_id: Uuid,
        job_type: String,
    },
    Started {
        job_id: Uuid,
    },
    Completed {
        job_id: Uuid,
    },
    Failed {
        job_id: Uuid,
        error: String,
    },
    Cancelled {
        job_id: Uuid,
    },
}

impl QueueEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            QueueEvent::Queued { job_id, .. }
            | QueueEvent::Started { job_id }
            | QueueEvent::Completed { job_id }
            | QueueEvent::Failed { job_id, .. }
            | QueueEvent::Cancelled { job_id } => *job_id,
        }
    }
}

/// Job queue with per-type handlers and a record of every job
pub struct JobQueue {
    executor: ExecutionQueue,
    store: Arc<dyn JobStore>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    event_tx: broadcast::Sender<QueueEvent>,
    /// Cancelled jobs the executor has not dequeued yet
    withdrawn: Arc<Mutex<HashSet<Uuid>>>,
}

impl JobQueue {
    /// Queue backed by an in-memory store
    pub fn new(executor: ExecutionQueue) -> Self {
        Self::with_store(executor, Arc::new(InMemoryJobStore::new()))
    }

    pub fn with_store(executor: ExecutionQueue, store: Arc<dyn JobStore>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            executor,
            store,
            handlers: RwLock::new(HashMap::new()),
            event_tx,
            withdrawn: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Register (or replace) the handler for `job_type`
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        tracing::debug!(job_type = %job_type, "job handler registered");
        self.handlers.write().insert(job_type, handler);
    }

    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    pub fn executor(&self) -> &ExecutionQueue {
        &self.executor
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    /// Record a job of `job_type` and queue its run. Fails without recording
    /// anything when no handler is registered for the type.
    pub async fn enqueue_typed(&self, job_type: &str, payload: Value) -> Result<Uuid> {
        let handler = self
            .handlers
            .read()
            .get(job_type)
            .cloned()
            .ok_or_else(|| HeapError::UnknownJobType(job_type.to_string()))?;

        let job = QueueJob::new(job_type, payload.clone());
        let id = job.id;
        self.store.insert(&job).await?;
        tracing::info!(job_id = %id, job_type = %job_type, "job queued");
        let _ = self.event_tx.send(QueueEvent::Queued {
            job_id: id,
            job_type: job_type.to_string(),
        });

        let run = JobRun {
            store: self.store.clone(),
            events: self.event_tx.clone(),
            withdrawn: self.withdrawn.clone(),
            handler,
            id,
            payload,
        };
        let handle = self.executor.enqueue(async move {
            run.execute().await;
            Ok::<_, HeapError>(())
        });
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                tracing::warn!(job_id = %id, error = %e, "job run aborted");
            }
        });

        Ok(id)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<QueueJob>> {
        self.store.get(id).await
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<QueueJob>> {
        self.store.list(filter).await
    }

    /// Executor counters, with cancelled jobs left out of `queued`
    pub fn get_status(&self) -> QueueStatus {
        let mut status = self.executor.status();
        status.queued = status.queued.saturating_sub(self.withdrawn.lock().len());
        status
    }

    /// Withdraw a job that has not started. Returns false when the job is
    /// unknown or already past `queued`.
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        // Marked first so a run that starts meanwhile can clear it
        self.withdrawn.lock().insert(id);
        let cancelled = match self
            .store
            .transition(id, JobStatus::Queued, &JobTransition::cancelled())
            .await
        {
            Ok(cancelled) => cancelled,
            Err(e) => {
                self.withdrawn.lock().remove(&id);
                return Err(e);
            }
        };

        if cancelled {
            tracing::info!(job_id = %id, "job cancelled");
            let _ = self.event_tx.send(QueueEvent::Cancelled { job_id: id });
        } else {
            self.withdrawn.lock().remove(&id);
        }
        Ok(cancelled)
    }
}

/// Everything one typed run needs, detached from the queue
struct JobRun {
    store: Arc<dyn JobStore>,
    events: broadcast::Sender<QueueEvent>,
    withdrawn: Arc<Mutex<HashSet<Uuid>>>,
    handler: Arc<dyn JobHandler>,
    id: Uuid,
    payload: Value,
}

impl JobRun {
    /// Drive the job to a terminal state. Store failures are logged and the
    /// job is failed, so subscribers always see a terminal event.
    async fn execute(self) {
        let id = self.id;
        self.withdrawn.lock().remove(&id);

        match self
            .store
            .transition(id, JobStatus::Queued, &JobTransition::running())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.withdrawn.lock().remove(&id);
                tracing::debug!(job_id = %id, "job withdrawn before start");
                return;
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "could not mark job running");
                self.fail(JobStatus::Queued, format!("job store error: {}", e)).await;
                return;
            }
        }
        let _ = self.events.send(QueueEvent::Started { job_id: id });

        let outcome = match AssertUnwindSafe(self.handler.run(self.payload.clone()))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(HeapError::Job("job handler panicked".to_string())),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.fail(JobStatus::Running, e.to_string()).await;
                return;
            }
        };

        match self
            .store
            .transition(id, JobStatus::Running, &JobTransition::completed(result))
            .await
        {
            Ok(true) => {
                tracing::info!(job_id = %id, "job completed");
                let _ = self.events.send(QueueEvent::Completed { job_id: id });
            }
            Ok(false) => {
                tracing::warn!(job_id = %id, "job left running state before completing");
                let _ = self.events.send(QueueEvent::Completed { job_id: id });
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "could not record job result");
                self.fail(JobStatus::Running, format!("job store error: {}", e)).await;
            }
        }
    }

    /// Record `message` as the failure of a job currently in `from`, then
    /// announce it whether or not the record could be written.
    async fn fail(&self, from: JobStatus, message: String) {
        match self
            .store
            .transition(self.id, from, &JobTransition::failed(&message))
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(job_id = %self.id, "failure not recorded, job moved on"),
            Err(e) => tracing::warn!(job_id = %self.id, error = %e, "could not record job failure"),
        }
        tracing::warn!(job_id = %self.id, error = %message, "job failed");
        let _ = self.events.send(QueueEvent::Failed {
            job_id: self.id,
            error: message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn queue(concurrency: usize) -> JobQueue {
        let queue = JobQueue::new(ExecutionQueue::new(concurrency));
        queue.register(
            "double",
            handler_fn(|payload: Value| async move {
                let n = payload["n"].as_i64().unwrap_or(0);
                Ok::<_, HeapError>(json!({ "n": n * 2 }))
            }),
        );
        queue.register(
            "explode",
            handler_fn(|_payload: Value| async move {
                Err::<Value, _>(HeapError::Job("kaboom".to_string()))
            }),
        );
        queue
    }

    async fn wait_for_terminal(queue: &JobQueue, id: Uuid) -> QueueJob {
        for _ in 0..200 {
            let job = queue.get_job(id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never settled", id);
    }

    #[tokio::test]
    async fn test_enqueue_typed_completes() {
        let queue = queue(2);
        let id = queue.enqueue_typed("double", json!({"n": 21})).await.unwrap();
        let job = wait_for_terminal(&queue, id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(json!({"n": 42})));
        assert_eq!(job.job_type, "double");
    }

    #[tokio::test]
    async fn test_unknown_type_is_rejected_without_record() {
        let queue = queue(2);
        let result = queue.enqueue_typed("nope", json!(null)).await;
        assert!(matches!(result, Err(HeapError::UnknownJobType(t)) if t == "nope"));
        assert!(queue.list_jobs(&JobFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_handler_records_error() {
        let queue = queue(1);
        let failing = queue.enqueue_typed("explode", json!(null)).await.unwrap();
        let fine = queue.enqueue_typed("double", json!({"n": 1})).await.unwrap();

        let failed = wait_for_terminal(&queue, failing).await;
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("kaboom"));

        let done = wait_for_terminal(&queue, fine).await;
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let queue = JobQueue::new(ExecutionQueue::new(1));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
        queue.register(
            "block",
            handler_fn(move |_payload: Value| {
                let release_rx = release_rx.clone();
                async move {
                    if let Some(rx) = release_rx.lock().await.take() {
                        let _ = rx.await;
                    }
                    Ok::<_, HeapError>(Value::Null)
                }
            }),
        );

        let blocker = queue.enqueue_typed("block", json!(null)).await.unwrap();
        let waiting = queue.enqueue_typed("block", json!(null)).await.unwrap();

        assert!(queue.cancel(waiting).await.unwrap());
        assert!(!queue.cancel(waiting).await.unwrap());
        let status = queue.get_status();
        assert_eq!((status.queued, status.running), (0, 1));

        release_tx.send(()).unwrap();
        assert_eq!(
            wait_for_terminal(&queue, blocker).await.status,
            JobStatus::Completed
        );

        let cancelled = wait_for_terminal(&queue, waiting).await;
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.started_at.is_none());
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let queue = queue(1);
        let mut events = queue.subscribe();
        let id = queue.enqueue_typed("double", json!({"n": 2})).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.job_id(), id);
            seen.push(event);
        }
        assert!(matches!(seen[0], QueueEvent::Queued { .. }));
        assert!(matches!(seen[1], QueueEvent::Started { .. }));
        assert!(matches!(seen[2], QueueEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_recorded_as_failed() {
        let queue = JobQueue::new(ExecutionQueue::new(1));
        queue.register(
            "panic",
            handler_fn(|_payload: Value| async move {
                if true {
                    panic!("handler bug");
                }
                Ok::<_, HeapError>(Value::Null)
            }),
        );
        let id = queue.enqueue_typed("panic", json!(null)).await.unwrap();
        let job = wait_for_terminal(&queue, id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("panicked"));
    }

    /// Store whose transitions into `broken` fail
    struct BrokenStore {
        inner: InMemoryJobStore,
        broken: JobStatus,
    }

    #[async_trait]
    impl JobStore for BrokenStore {
        async fn insert(&self, job: &QueueJob) -> Result<()> {
            self.inner.insert(job).await
        }

        async fn transition(
            &self,
            id: Uuid,
            from: JobStatus,
            transition: &JobTransition,
        ) -> Result<bool> {
            if transition.status == self.broken {
                return Err(HeapError::Internal("disk full".to_string()));
            }
            self.inner.transition(id, from, transition).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<QueueJob>> {
            self.inner.get(id).await
        }

        async fn list(&self, filter: &JobFilter) -> Result<Vec<QueueJob>> {
            self.inner.list(filter).await
        }
    }

    fn broken_queue(broken: JobStatus) -> JobQueue {
        let store = Arc::new(BrokenStore {
            inner: InMemoryJobStore::new(),
            broken,
        });
        let queue = JobQueue::with_store(ExecutionQueue::new(1), store);
        queue.register(
            "noop",
            handler_fn(|_payload: Value| async move { Ok::<_, HeapError>(Value::Null) }),
        );
        queue
    }

    async fn next_terminal(events: &mut broadcast::Receiver<QueueEvent>) -> QueueEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap();
            if !matches!(event, QueueEvent::Queued { .. } | QueueEvent::Started { .. }) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_unrecorded_result_fails_the_job() {
        let queue = broken_queue(JobStatus::Completed);
        let mut events = queue.subscribe();
        let id = queue.enqueue_typed("noop", json!(null)).await.unwrap();

        let event = next_terminal(&mut events).await;
        assert!(matches!(&event, QueueEvent::Failed { job_id, error }
            if *job_id == id && error.contains("disk full")));

        let job = wait_for_terminal(&queue, id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("job store error"));

        for _ in 0..200 {
            if queue.get_status().running == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(queue.get_status().running, 0);
    }

    #[tokio::test]
    async fn test_job_that_cannot_start_fails() {
        let queue = broken_queue(JobStatus::Running);
        let mut events = queue.subscribe();
        let id = queue.enqueue_typed("noop", json!(null)).await.unwrap();

        assert!(matches!(next_terminal(&mut events).await, QueueEvent::Failed { .. }));
        let job = wait_for_terminal(&queue, id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.started_at.is_none());
    }
}
