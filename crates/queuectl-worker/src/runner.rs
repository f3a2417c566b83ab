//! Worker pool: N long-lived workers plus the retry scheduler.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing;

use queuectl_core::config::QueueConfig;
use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;

use crate::executor::ShellExecutor;
use crate::queue::JobQueue;
use crate::scheduler::spawn_retry_scheduler;

/// How long an idle worker waits on the channel before re-checking shutdown.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);
/// Grace period for workers to finish their current job at shutdown.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
/// Grace period for the retry scheduler at shutdown.
const SCHEDULER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Point-in-time view of one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub id: String,
    pub running: bool,
    pub shutdown_requested: bool,
}

#[derive(Debug)]
struct WorkerHandle {
    id: String,
    running: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Owns the worker tasks and the retry scheduler.
#[derive(Debug)]
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    executor: ShellExecutor,
    config: QueueConfig,
    running: AtomicBool,
    next_worker_id: AtomicUsize,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    workers: Mutex<Vec<WorkerHandle>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(queue: Arc<JobQueue>, config: QueueConfig) -> Self {
        let executor = ShellExecutor::new(config.job_timeout_seconds);
        Self {
            queue,
            executor,
            config,
            running: AtomicBool::new(false),
            next_worker_id: AtomicUsize::new(0),
            shutdown_tx: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            scheduler: Mutex::new(None),
        }
    }

    /// Start `count` workers (config default when `None`) and the retry
    /// scheduler. A no-op with a warning when already running.
    pub async fn start(&self, count: Option<usize>) -> AppResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Worker pool is already running");
            return Ok(());
        }

        let count = count.unwrap_or(self.config.worker_count);
        self.queue.initialize().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for _ in 0..count {
            self.spawn_worker(shutdown_rx.clone()).await;
        }

        let interval = Duration::from_secs(self.config.retry_check_interval_seconds);
        let scheduler = spawn_retry_scheduler(Arc::clone(&self.queue), interval, shutdown_rx);
        *self.scheduler.lock().await = Some(scheduler);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        tracing::info!("Worker pool started with {} workers", count);
        Ok(())
    }

    /// Signal shutdown and wait for workers and the scheduler to drain.
    ///
    /// Workers get [`WORKER_DRAIN_TIMEOUT`] to finish their current job;
    /// laggards are aborted and their job stays `processing` until the
    /// startup reconciliation requeues it.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            tracing::warn!("Worker pool is not running");
            return;
        }

        tracing::info!("Stopping worker pool...");
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            // Receivers may already be gone; nothing to do then.
            let _ = tx.send(true);
        }

        let deadline = tokio::time::Instant::now() + WORKER_DRAIN_TIMEOUT;
        let mut workers = self.workers.lock().await;
        for mut handle in workers.drain(..) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle.join).await.is_err() {
                tracing::warn!(
                    "Worker {} did not stop within the grace period, aborting",
                    handle.id
                );
                handle.join.abort();
            }
        }
        drop(workers);

        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            if tokio::time::timeout(SCHEDULER_DRAIN_TIMEOUT, &mut scheduler)
                .await
                .is_err()
            {
                tracing::warn!("Retry scheduler did not stop in time, aborting");
                scheduler.abort();
            }
        }

        tracing::info!("Worker pool stopped");
    }

    /// Spawn `count` additional workers on the shared channel.
    pub async fn add_workers(&self, count: usize) -> AppResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AppError::validation("Worker pool is not running"));
        }

        let shutdown_rx = {
            let guard = self.shutdown_tx.lock().await;
            let tx = guard
                .as_ref()
                .ok_or_else(|| AppError::internal("Worker pool has no shutdown channel"))?;
            tx.subscribe()
        };

        for _ in 0..count {
            self.spawn_worker(shutdown_rx.clone()).await;
        }

        tracing::info!(
            "Added {} workers, total workers: {}",
            count,
            self.worker_count().await
        );
        Ok(())
    }

    /// Whether the pool has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Total number of spawned workers.
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Number of workers whose loop is currently alive.
    pub async fn active_worker_count(&self) -> usize {
        self.workers
            .lock()
            .await
            .iter()
            .filter(|w| w.running.load(Ordering::SeqCst))
            .count()
    }

    /// Per-worker status flags.
    pub async fn status(&self) -> Vec<WorkerStatus> {
        let shutdown_requested = match self.shutdown_tx.lock().await.as_ref() {
            Some(tx) => *tx.borrow(),
            None => false,
        };

        self.workers
            .lock()
            .await
            .iter()
            .map(|w| WorkerStatus {
                id: w.id.clone(),
                running: w.running.load(Ordering::SeqCst),
                shutdown_requested,
            })
            .collect()
    }

    async fn spawn_worker(&self, shutdown_rx: watch::Receiver<bool>) {
        let number = self.next_worker_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("worker-{number}");
        let running = Arc::new(AtomicBool::new(false));

        let join = tokio::spawn(worker_loop(
            id.clone(),
            Arc::clone(&self.queue),
            self.executor.clone(),
            Arc::clone(&running),
            shutdown_rx,
        ));

        self.workers.lock().await.push(WorkerHandle { id, running, join });
    }
}

/// One worker's processing loop.
///
/// The idle wait on the channel is raced against the shutdown signal, so a
/// stopping pool does not sit out the dequeue timeout (the pending recv is
/// cancel-safe). An in-flight execution is never interrupted; it runs to
/// its own timeout or completion. Store errors are transient for the
/// worker: log and keep going.
async fn worker_loop(
    worker_id: String,
    queue: Arc<JobQueue>,
    executor: ShellExecutor,
    running: Arc<AtomicBool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    running.store(true, Ordering::SeqCst);
    tracing::info!("Worker {} started", worker_id);

    while !*shutdown_rx.borrow() {
        let dequeued = tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means the pool is gone.
                if changed.is_err() {
                    break;
                }
                continue;
            }
            result = queue.dequeue(DEQUEUE_TIMEOUT) => result,
        };

        let job = match dequeued {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("Worker {} failed to dequeue: {}", worker_id, e);
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        tracing::info!(
            "Worker {} processing job {}: {}",
            worker_id,
            job.id,
            job.command
        );
        let result = executor.execute(&job).await;

        if !result.output.is_empty() {
            tracing::debug!("Job {} output: {}", job.id, result.output);
        }

        if result.success {
            match queue.complete(job.id).await {
                Ok(()) => tracing::info!("Worker {} completed job {}", worker_id, job.id),
                Err(e) => tracing::error!(
                    "Worker {} could not record completion of {}: {}",
                    worker_id,
                    job.id,
                    e
                ),
            }
        } else {
            let reason = result
                .error_message
                .unwrap_or_else(|| "worker exception: execution reported no reason".to_string());
            match queue.fail(job.id, &reason).await {
                Ok(()) => tracing::warn!(
                    "Worker {} failed job {}: {}",
                    worker_id,
                    job.id,
                    reason
                ),
                Err(e) => tracing::error!(
                    "Worker {} could not record failure of {}: {}",
                    worker_id,
                    job.id,
                    e
                ),
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    tracing::info!("Worker {} stopped", worker_id);
}
