//! Queue coordinator: the single owner of job lifecycle transitions.
//!
//! Every state change goes through exactly one method here, which keeps the
//! durable store and the in-memory pending channel from ever disagreeing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing;

use queuectl_core::config::QueueConfig;
use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;
use queuectl_core::types::JobId;
use queuectl_entity::job::{Job, JobState};
use queuectl_store::{JobStatistics, JobStore};

use crate::channel::PendingChannel;

/// Retry delays are capped at one hour regardless of the backoff curve.
const MAX_RETRY_DELAY_SECS: u64 = 3600;

/// Coordinates job lifecycle transitions across the store and the channel.
#[derive(Debug)]
pub struct JobQueue {
    store: Arc<JobStore>,
    channel: PendingChannel,
    backoff_base: u32,
    default_max_retries: u32,
    initialized: AtomicBool,
}

impl JobQueue {
    pub fn new(store: Arc<JobStore>, config: &QueueConfig) -> Self {
        Self {
            store,
            channel: PendingChannel::new(),
            backoff_base: config.backoff_base,
            default_max_retries: config.max_retries,
            initialized: AtomicBool::new(false),
        }
    }

    /// Load stored pending jobs into the channel. Idempotent.
    ///
    /// Jobs reconciled from a crashed run arrive here as pending, so they
    /// are picked up again without operator action.
    pub async fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        let pending = self.store.list_by_state(JobState::Pending).await;
        let count = pending.len();
        for job in pending {
            self.channel.push(job.id);
        }

        if count > 0 {
            tracing::info!("Loaded {} pending jobs into the queue", count);
        }
    }

    /// Create a new pending job and offer it to the channel.
    pub async fn enqueue(&self, command: &str, max_retries: Option<u32>) -> AppResult<JobId> {
        if command.trim().is_empty() {
            return Err(AppError::validation("Command cannot be empty"));
        }

        let job = Job::new(command, max_retries.unwrap_or(self.default_max_retries));
        let id = job.id;

        self.store.put(job).await?;
        self.channel.push(id);

        tracing::info!("Job enqueued: {} - {}", id, command);
        Ok(id)
    }

    /// Claim the next pending job, waiting up to `timeout` when none is queued.
    ///
    /// Transitions the claimed record to `processing` (durably) and returns
    /// a value copy for the worker. Ids whose record was deleted or is no
    /// longer pending are skipped; this is the best-effort channel removal
    /// of `delete` and the guard against double claims.
    pub async fn dequeue(&self, timeout: Duration) -> AppResult<Option<Job>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let Some(id) = self.channel.recv(remaining).await else {
                return Ok(None);
            };

            let Some(mut job) = self.store.get(id).await else {
                tracing::debug!("Skipping stale queue entry {} (deleted)", id);
                continue;
            };
            if job.state != JobState::Pending {
                tracing::debug!(
                    "Skipping stale queue entry {} (state {})",
                    id,
                    job.state
                );
                continue;
            }

            job.mark_processing();
            self.store.put(job.clone()).await?;
            tracing::debug!("Job dequeued for processing: {}", id);
            return Ok(Some(job));
        }
    }

    /// Mark a processing job as completed.
    pub async fn complete(&self, id: JobId) -> AppResult<()> {
        let mut job = self.require(id).await?;
        job.mark_completed();
        self.store.put(job.clone()).await?;

        tracing::info!("Job completed: {} - {}", id, job.command);
        Ok(())
    }

    /// Record a failed attempt, scheduling a retry or moving to the DLQ.
    ///
    /// The k-th failure of a job with budget m stays `failed` (with the
    /// next retry at `min(base^k, 3600)` seconds) while k < m, and becomes
    /// `dead` once k >= m.
    pub async fn fail(&self, id: JobId, reason: &str) -> AppResult<()> {
        let mut job = self.require(id).await?;
        let attempt = job.attempts + 1;

        if attempt < job.max_retries {
            let delay = retry_delay(self.backoff_base, attempt);
            job.mark_failed(reason, chrono::Duration::seconds(delay.as_secs() as i64));
            self.store.put(job.clone()).await?;

            tracing::warn!(
                "Job failed (attempt {}/{}): {} - {} - next retry in {}s",
                job.attempts,
                job.max_retries,
                id,
                reason,
                delay.as_secs()
            );
        } else {
            job.mark_dead(reason);
            self.store.put(job.clone()).await?;

            tracing::error!(
                "Job moved to DLQ after {} attempts: {} - {}",
                job.attempts,
                id,
                reason
            );
        }
        Ok(())
    }

    /// Requeue every failed job whose backoff delay has elapsed.
    pub async fn process_retries(&self, now: NaiveDateTime) -> AppResult<usize> {
        let ready = self.store.list_ready_for_retry(now).await;
        let count = ready.len();

        for mut job in ready {
            job.reset_for_retry();
            self.store.put(job.clone()).await?;
            self.channel.push(job.id);
            tracing::info!(
                "Job requeued for retry: {} ({}/{} attempts used)",
                job.id,
                job.attempts,
                job.max_retries
            );
        }

        if count > 0 {
            tracing::info!("Processed {} jobs for retry", count);
        }
        Ok(count)
    }

    /// Re-run a dead job as a fresh record, preserving the audit trail.
    ///
    /// Returns the new job's id, or `None` when `id` is not a dead job.
    pub async fn retry_dead(&self, id: JobId) -> AppResult<Option<JobId>> {
        let Some(job) = self.store.get(id).await else {
            return Ok(None);
        };
        if job.state != JobState::Dead {
            return Ok(None);
        }

        let new_id = self.enqueue(&job.command, Some(job.max_retries)).await?;
        tracing::info!("Dead job {} retried as new job {}: {}", id, new_id, job.command);
        Ok(Some(new_id))
    }

    /// Delete a job record. Channel removal is best-effort (stale ids are
    /// skipped at dequeue).
    pub async fn delete(&self, id: JobId) -> AppResult<bool> {
        self.store.delete(id).await
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.store.get(id).await
    }

    /// Snapshot of all records.
    pub async fn all_jobs(&self) -> Vec<Job> {
        self.store.all().await
    }

    /// Snapshot of records in the given state.
    pub async fn jobs_by_state(&self, state: JobState) -> Vec<Job> {
        self.store.list_by_state(state).await
    }

    /// Per-state counts.
    pub async fn statistics(&self) -> JobStatistics {
        self.store.statistics().await
    }

    /// Number of ids currently waiting in the channel.
    pub fn pending_in_channel(&self) -> usize {
        self.channel.len()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    async fn require(&self, id: JobId) -> AppResult<Job> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))
    }
}

/// Backoff delay for the k-th failure: `min(base^k, 3600)` seconds.
/// Overflow saturates to the cap.
fn retry_delay(base: u32, attempt: u32) -> Duration {
    let secs = (base as u64)
        .checked_pow(attempt)
        .map_or(MAX_RETRY_DELAY_SECS, |d| d.min(MAX_RETRY_DELAY_SECS));
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use queuectl_entity::job::model;

    use super::*;

    async fn queue_in(dir: &tempfile::TempDir) -> JobQueue {
        let store = Arc::new(
            JobStore::open(dir.path().join("jobs.json"))
                .await
                .expect("open store"),
        );
        JobQueue::new(store, &QueueConfig::default())
    }

    #[test]
    fn test_retry_delay_curve() {
        assert_eq!(retry_delay(2, 1), Duration::from_secs(2));
        assert_eq!(retry_delay(2, 2), Duration::from_secs(4));
        assert_eq!(retry_delay(2, 3), Duration::from_secs(8));
        assert_eq!(retry_delay(3, 2), Duration::from_secs(9));
    }

    #[test]
    fn test_retry_delay_capped_at_one_hour() {
        assert_eq!(retry_delay(2, 12), Duration::from_secs(3600));
        assert_eq!(retry_delay(10, 30), Duration::from_secs(3600));
        // 2^64 overflows u64; the cap must still hold.
        assert_eq!(retry_delay(2, 64), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_empty_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        assert!(queue.enqueue("", None).await.is_err());
        assert!(queue.enqueue("   ", None).await.is_err());
        assert_eq!(queue.statistics().await.total(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_complete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let id = queue.enqueue("echo hi", None).await.expect("enqueue");
        let job = queue
            .dequeue(Duration::from_millis(100))
            .await
            .expect("dequeue")
            .expect("job available");
        assert_eq!(job.id, id);
        assert_eq!(job.state, JobState::Processing);

        queue.complete(id).await.expect("complete");
        let stored = queue.get(id).await.expect("found");
        assert_eq!(stored.state, JobState::Completed);
        assert!(stored.error_message.is_none());
        assert_eq!(stored.attempts, 0);
    }

    #[tokio::test]
    async fn test_dequeue_empty_times_out_without_state_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let result = queue.dequeue(Duration::from_millis(50)).await.expect("dequeue");
        assert!(result.is_none());
        assert_eq!(queue.statistics().await.total(), 0);
    }

    #[tokio::test]
    async fn test_dequeued_job_not_claimable_twice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        queue.enqueue("echo once", None).await.expect("enqueue");
        let first = queue
            .dequeue(Duration::from_millis(100))
            .await
            .expect("dequeue");
        assert!(first.is_some());

        let second = queue
            .dequeue(Duration::from_millis(50))
            .await
            .expect("dequeue");
        assert!(second.is_none(), "claimed job must not be claimable again");
    }

    #[tokio::test]
    async fn test_fail_schedules_retry_with_backoff() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let id = queue.enqueue("false", Some(3)).await.expect("enqueue");
        queue.dequeue(Duration::from_millis(100)).await.expect("dequeue");
        queue.fail(id, "Command failed with exit code 1").await.expect("fail");

        let job = queue.get(id).await.expect("found");
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);

        let retry_at = job.next_retry_at.expect("retry hint");
        // backoff_base^1 = 2 seconds, stored exactly.
        assert_eq!(retry_at - job.updated_at, chrono::Duration::seconds(2));
    }

    #[tokio::test]
    async fn test_fail_exhausting_budget_is_dead() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let id = queue.enqueue("false", Some(2)).await.expect("enqueue");

        queue.dequeue(Duration::from_millis(100)).await.expect("dequeue");
        queue.fail(id, "1st").await.expect("fail");
        assert_eq!(queue.get(id).await.expect("found").state, JobState::Failed);

        // Second failure hits the budget: k >= m.
        queue.process_retries(model::now() + chrono::Duration::seconds(10))
            .await
            .expect("retries");
        queue.dequeue(Duration::from_millis(100)).await.expect("dequeue");
        queue.fail(id, "2nd").await.expect("fail");

        let job = queue.get(id).await.expect("found");
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.error_message.as_deref(), Some("2nd"));
        assert!(job.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn test_zero_budget_dies_on_first_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let id = queue.enqueue("false", Some(0)).await.expect("enqueue");
        queue.dequeue(Duration::from_millis(100)).await.expect("dequeue");
        queue.fail(id, "exit 1").await.expect("fail");

        let job = queue.get(id).await.expect("found");
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_process_retries_requeues_ready_jobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let id = queue.enqueue("false", Some(3)).await.expect("enqueue");
        queue.dequeue(Duration::from_millis(100)).await.expect("dequeue");
        queue.fail(id, "boom").await.expect("fail");

        // Before the delay elapses nothing is requeued.
        let count = queue.process_retries(model::now()).await.expect("retries");
        assert_eq!(count, 0);

        let count = queue
            .process_retries(model::now() + chrono::Duration::seconds(10))
            .await
            .expect("retries");
        assert_eq!(count, 1);

        let job = queue.get(id).await.expect("found");
        assert_eq!(job.state, JobState::Pending);
        assert!(job.error_message.is_none());
        assert!(job.next_retry_at.is_none());
        assert_eq!(job.attempts, 1, "requeue must not consume budget");
        assert_eq!(queue.pending_in_channel(), 1);
    }

    #[tokio::test]
    async fn test_retry_dead_creates_fresh_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let id = queue.enqueue("false", Some(0)).await.expect("enqueue");
        queue.dequeue(Duration::from_millis(100)).await.expect("dequeue");
        queue.fail(id, "exit 1").await.expect("fail");

        let new_id = queue
            .retry_dead(id)
            .await
            .expect("retry")
            .expect("was dead");
        assert_ne!(new_id, id);

        let original = queue.get(id).await.expect("original kept");
        assert_eq!(original.state, JobState::Dead);
        assert_eq!(original.attempts, 1);

        let fresh = queue.get(new_id).await.expect("new record");
        assert_eq!(fresh.state, JobState::Pending);
        assert_eq!(fresh.attempts, 0);
        assert_eq!(fresh.command, original.command);
        assert_eq!(fresh.max_retries, original.max_retries);
    }

    #[tokio::test]
    async fn test_retry_dead_ignores_non_dead_jobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let id = queue.enqueue("echo hi", None).await.expect("enqueue");
        assert!(queue.retry_dead(id).await.expect("retry").is_none());
        assert!(queue.retry_dead(JobId::new()).await.expect("retry").is_none());
    }

    #[tokio::test]
    async fn test_deleted_job_skipped_at_dequeue() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = queue_in(&dir).await;

        let doomed = queue.enqueue("echo doomed", None).await.expect("enqueue");
        let kept = queue.enqueue("echo kept", None).await.expect("enqueue");

        assert!(queue.delete(doomed).await.expect("delete"));

        let job = queue
            .dequeue(Duration::from_millis(100))
            .await
            .expect("dequeue")
            .expect("kept job");
        assert_eq!(job.id, kept);
    }

    #[tokio::test]
    async fn test_initialize_loads_stored_pending_jobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobs.json");

        {
            let store = Arc::new(JobStore::open(&path).await.expect("open"));
            let queue = JobQueue::new(store, &QueueConfig::default());
            queue.enqueue("echo persisted", None).await.expect("enqueue");
        }

        let store = Arc::new(JobStore::open(&path).await.expect("reopen"));
        let queue = JobQueue::new(store, &QueueConfig::default());
        assert_eq!(queue.pending_in_channel(), 0);

        queue.initialize().await;
        assert_eq!(queue.pending_in_channel(), 1);

        // Idempotent: a second call must not duplicate entries.
        queue.initialize().await;
        assert_eq!(queue.pending_in_channel(), 1);
    }
}
