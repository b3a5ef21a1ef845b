//! Worker loop: drains one queue, hands each payload to a [`TaskHandler`], backs off on
//! failure and only stops on explicit shutdown.
//!
//! Several loops may run against the same queue, in one process (`concurrency`) or
//! across processes; the backend's atomic pop keeps each item with one worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use fileflow_core::{QueueConfig, WorkerConfig};

use crate::context::{TaskHandler, TaskOutcome};
use crate::queue::{QueueError, TaskQueue};

/// Interval between sweeps of expired progress and state entries.
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 60;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct WorkerLoopConfig {
    pub queue_name: String,
    /// Sleep after an empty dequeue.
    pub poll_interval: Duration,
    /// Sleep after a store error, a panicked handler or a recoverable handler error.
    pub error_backoff: Duration,
    /// Number of loops started by [`WorkerLoop::start`].
    pub concurrency: usize,
    /// Zero disables the expiry sweep.
    pub purge_interval: Duration,
}

impl WorkerLoopConfig {
    pub fn from_config(queue: &QueueConfig, worker: &WorkerConfig) -> Self {
        Self {
            queue_name: queue.queue_name.clone(),
            poll_interval: worker.poll_interval(),
            error_backoff: worker.error_backoff(),
            concurrency: worker.concurrency.max(1),
            purge_interval: Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS),
        }
    }
}

impl Default for WorkerLoopConfig {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default(), &WorkerConfig::default())
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Queue was empty.
    Idle,
    /// An item was taken off the queue and dealt with, successfully or not.
    Processed,
    /// The store or handler failed in a way that warrants waiting.
    Backoff,
}

pub struct WorkerLoop<H: TaskHandler> {
    queue: TaskQueue,
    handler: Arc<H>,
    config: WorkerLoopConfig,
    events: broadcast::Sender<TaskOutcome>,
}

impl<H: TaskHandler> Clone for WorkerLoop<H> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            handler: Arc::clone(&self.handler),
            config: self.config.clone(),
            events: self.events.clone(),
        }
    }
}

impl<H: TaskHandler> WorkerLoop<H> {
    pub fn new(queue: TaskQueue, handler: Arc<H>, config: WorkerLoopConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            queue,
            handler,
            config,
            events,
        }
    }

    pub fn config(&self) -> &WorkerLoopConfig {
        &self.config
    }

    /// Completion notifications for every task this loop processes. Polling the
    /// queue store remains the contract for other processes.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskOutcome> {
        self.events.subscribe()
    }

    /// Dequeue at most one item and process it.
    ///
    /// The handler runs on its own task so a panic is contained and reported as
    /// [`Tick::Backoff`].
    pub async fn run_once(&self) -> Tick {
        let queue_name = &self.config.queue_name;
        let payload = match self.queue.try_dequeue::<H::Payload>(queue_name).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::trace!(queue = %queue_name, "No tasks available in queue");
                return Tick::Idle;
            }
            Err(QueueError::Serialization(msg)) => {
                tracing::error!(queue = %queue_name, error = %msg, "Discarded undecodable task payload");
                return Tick::Processed;
            }
            Err(e) => {
                tracing::error!(queue = %queue_name, error = %e, "Failed to dequeue task");
                return Tick::Backoff;
            }
        };

        let handler = Arc::clone(&self.handler);
        let joined = tokio::spawn(async move { handler.handle(payload).await }).await;

        match joined {
            Ok(Ok(outcome)) => {
                tracing::info!(
                    task_id = %outcome.task_id,
                    status = %outcome.state.status(),
                    "Task finished"
                );
                // No subscribers is fine
                let _ = self.events.send(outcome);
                Tick::Processed
            }
            Ok(Err(e)) => {
                tracing::error!(
                    task_id = %e.task_id(),
                    error = %e,
                    recoverable = e.is_recoverable(),
                    "Task handler failed"
                );
                if e.is_recoverable() {
                    Tick::Backoff
                } else {
                    Tick::Processed
                }
            }
            Err(e) => {
                tracing::error!(error = %e, panicked = e.is_panic(), "Task handler aborted");
                Tick::Backoff
            }
        }
    }

    /// Spawn `concurrency` loops plus the expiry sweep.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(self.config.concurrency + 1);

        tracing::info!(
            queue = %self.config.queue_name,
            backend = self.queue.backend_name(),
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            error_backoff_ms = self.config.error_backoff.as_millis() as u64,
            "Worker loop started"
        );

        for worker_id in 0..self.config.concurrency.max(1) {
            let worker = self.clone();
            let rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move { worker.run(worker_id, rx).await }));
        }

        if !self.config.purge_interval.is_zero() {
            let queue = self.queue.clone();
            let interval = self.config.purge_interval;
            let rx = shutdown_rx.clone();
            handles.push(tokio::spawn(purge_loop(queue, interval, rx)));
        }

        WorkerHandle {
            shutdown_tx,
            handles,
        }
    }

    async fn run(self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.run_once().await {
                Tick::Processed => continue,
                Tick::Idle => self.config.poll_interval,
                Tick::Backoff => self.config.error_backoff,
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(pause) => {}
            }
        }

        tracing::info!(worker_id, "Worker loop stopped");
    }
}

async fn purge_loop(queue: TaskQueue, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match queue.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Purged expired task entries"),
                    Err(e) => tracing::error!(error = %e, "Task entry purge failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Handle to running worker loops.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal every loop to stop and wait for them. A task already being processed
    /// is allowed to finish first.
    pub async fn shutdown(self) {
        tracing::info!("Initiating worker shutdown");
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fileflow_core::{TaskError, TaskState};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    enum Mode {
        Succeed,
        FailTask,
        Recoverable,
        Unrecoverable,
        Panic,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Job {
        task_id: Uuid,
        mode: Mode,
    }

    struct TestHandler;

    #[async_trait]
    impl TaskHandler for TestHandler {
        type Payload = Job;

        async fn handle(&self, job: Job) -> Result<TaskOutcome, TaskError> {
            match job.mode {
                Mode::Succeed => Ok(TaskOutcome {
                    task_id: job.task_id,
                    state: TaskState::Completed {
                        record_id: job.task_id,
                    },
                }),
                Mode::FailTask => Ok(TaskOutcome {
                    task_id: job.task_id,
                    state: TaskState::Failed {
                        error: "source vanished".to_string(),
                    },
                }),
                Mode::Recoverable => Err(TaskError::transient(job.task_id, "store down")),
                Mode::Unrecoverable => Err(TaskError::rejected(job.task_id, "bad payload")),
                Mode::Panic => panic!("handler panicked"),
            }
        }
    }

    fn test_config() -> WorkerLoopConfig {
        WorkerLoopConfig {
            queue_name: "test".to_string(),
            poll_interval: Duration::from_millis(10),
            error_backoff: Duration::from_millis(10),
            concurrency: 2,
            purge_interval: Duration::from_millis(50),
        }
    }

    async fn push(queue: &TaskQueue, mode: Mode) -> Uuid {
        let task_id = Uuid::new_v4();
        assert!(queue.enqueue("test", &Job { task_id, mode }).await);
        task_id
    }

    #[test]
    fn test_default_config_intervals() {
        let config = WorkerLoopConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.error_backoff, Duration::from_secs(5));
        assert_eq!(config.queue_name, "file-processing");
        assert_eq!(config.concurrency, 1);
    }

    #[tokio::test]
    async fn test_run_once_ticks() {
        let queue = TaskQueue::in_memory();
        let worker = WorkerLoop::new(queue.clone(), Arc::new(TestHandler), test_config());

        assert_eq!(worker.run_once().await, Tick::Idle);

        push(&queue, Mode::Succeed).await;
        assert_eq!(worker.run_once().await, Tick::Processed);

        push(&queue, Mode::FailTask).await;
        assert_eq!(worker.run_once().await, Tick::Processed);

        push(&queue, Mode::Unrecoverable).await;
        assert_eq!(worker.run_once().await, Tick::Processed);

        push(&queue, Mode::Recoverable).await;
        assert_eq!(worker.run_once().await, Tick::Backoff);

        push(&queue, Mode::Panic).await;
        assert_eq!(worker.run_once().await, Tick::Backoff);

        assert_eq!(worker.run_once().await, Tick::Idle);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_skipped() {
        let queue = TaskQueue::in_memory();
        let worker = WorkerLoop::new(queue.clone(), Arc::new(TestHandler), test_config());
        assert!(queue.enqueue("test", &"not a job").await);
        assert_eq!(worker.run_once().await, Tick::Processed);
        assert_eq!(queue.len("test").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_loop_survives_failures_and_shuts_down() {
        let queue = TaskQueue::in_memory();
        let worker = WorkerLoop::new(queue.clone(), Arc::new(TestHandler), test_config());
        let mut events = worker.subscribe();

        push(&queue, Mode::Panic).await;
        push(&queue, Mode::Recoverable).await;
        let first = push(&queue, Mode::Succeed).await;
        let second = push(&queue, Mode::FailTask).await;

        let handle = worker.start();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            let outcome = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for outcome")
                .unwrap();
            seen.push(outcome.task_id);
        }
        assert!(seen.contains(&first));
        assert!(seen.contains(&second));

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown did not complete");
        assert_eq!(queue.len("test").await.unwrap(), 0);
    }
}
