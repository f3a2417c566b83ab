//! Dead-letter queue management.
//!
//! A thin operator-facing layer over the store for jobs in the terminal
//! `dead` state. Re-running a dead job always goes through the coordinator
//! so the original record stays untouched as an audit trail.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing;

use queuectl_core::result::AppResult;
use queuectl_core::types::JobId;
use queuectl_entity::job::{Job, JobState};
use queuectl_store::JobStore;

use crate::queue::JobQueue;

/// Aggregate statistics over the dead-letter queue.
#[derive(Debug, Clone, Serialize)]
pub struct DlqStatistics {
    /// Number of dead jobs.
    pub total: u64,
    /// `updated_at` of the oldest dead job.
    pub oldest: Option<NaiveDateTime>,
    /// `updated_at` of the newest dead job.
    pub newest: Option<NaiveDateTime>,
    /// Dead jobs whose error message mentions a timeout.
    pub timeout_errors: u64,
}

/// Operator surface over jobs that exhausted their retry budget.
#[derive(Debug, Clone)]
pub struct DlqManager {
    store: Arc<JobStore>,
    queue: Arc<JobQueue>,
}

impl DlqManager {
    pub fn new(store: Arc<JobStore>, queue: Arc<JobQueue>) -> Self {
        Self { store, queue }
    }

    /// All dead jobs.
    pub async fn dead_jobs(&self) -> Vec<Job> {
        self.store.list_by_state(JobState::Dead).await
    }

    /// Dead jobs with pagination.
    pub async fn dead_jobs_page(&self, offset: usize, limit: usize) -> Vec<Job> {
        self.dead_jobs()
            .await
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect()
    }

    /// A specific dead job; `None` when absent or not dead.
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.store
            .get(id)
            .await
            .filter(|job| job.state == JobState::Dead)
    }

    /// Dead jobs whose error message contains `pattern` (case-insensitive).
    pub async fn find_by_error(&self, pattern: &str) -> Vec<Job> {
        let pattern = pattern.to_lowercase();
        self.dead_jobs()
            .await
            .into_iter()
            .filter(|job| {
                job.error_message
                    .as_ref()
                    .is_some_and(|e| e.to_lowercase().contains(&pattern))
            })
            .collect()
    }

    /// Dead jobs whose last update falls within `(start, end)`.
    pub async fn find_by_time_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<Job> {
        self.dead_jobs()
            .await
            .into_iter()
            .filter(|job| job.updated_at > start && job.updated_at < end)
            .collect()
    }

    /// Number of dead jobs.
    pub async fn len(&self) -> usize {
        self.dead_jobs().await.len()
    }

    /// Whether the DLQ holds no jobs.
    pub async fn is_empty(&self) -> bool {
        self.dead_jobs().await.is_empty()
    }

    /// Whether `id` names a dead job.
    pub async fn contains(&self, id: JobId) -> bool {
        self.get(id).await.is_some()
    }

    /// Re-run one dead job as a fresh record. Returns whether a new job was
    /// enqueued.
    pub async fn retry(&self, id: JobId) -> AppResult<bool> {
        match self.queue.retry_dead(id).await? {
            Some(_) => Ok(true),
            None => {
                tracing::warn!("Cannot retry job {}: not found in DLQ", id);
                Ok(false)
            }
        }
    }

    /// Re-run the given dead jobs. Returns how many were enqueued.
    pub async fn retry_many(&self, ids: &[JobId]) -> AppResult<usize> {
        let mut retried = 0;
        for &id in ids {
            if self.retry(id).await? {
                retried += 1;
            }
        }
        tracing::info!("Retried {} out of {} dead jobs", retried, ids.len());
        Ok(retried)
    }

    /// Re-run every dead job.
    pub async fn retry_all(&self) -> AppResult<usize> {
        let ids: Vec<JobId> = self.dead_jobs().await.iter().map(|job| job.id).collect();
        self.retry_many(&ids).await
    }

    /// Re-run the dead jobs whose error message matches `pattern`.
    pub async fn retry_by_error(&self, pattern: &str) -> AppResult<usize> {
        let ids: Vec<JobId> = self
            .find_by_error(pattern)
            .await
            .iter()
            .map(|job| job.id)
            .collect();
        self.retry_many(&ids).await
    }

    /// Permanently delete one dead job.
    pub async fn delete(&self, id: JobId) -> AppResult<bool> {
        if self.get(id).await.is_none() {
            tracing::warn!("Cannot delete job {}: not found in DLQ", id);
            return Ok(false);
        }
        let deleted = self.store.delete(id).await?;
        if deleted {
            tracing::info!("Dead job {} deleted permanently", id);
        }
        Ok(deleted)
    }

    /// Permanently delete the given dead jobs. Returns how many were removed.
    pub async fn delete_many(&self, ids: &[JobId]) -> AppResult<usize> {
        let mut deleted = 0;
        for &id in ids {
            if self.delete(id).await? {
                deleted += 1;
            }
        }
        tracing::info!("Deleted {} out of {} dead jobs", deleted, ids.len());
        Ok(deleted)
    }

    /// Permanently delete every dead job.
    pub async fn clear_all(&self) -> AppResult<usize> {
        let deleted = self.store.delete_by_state(JobState::Dead).await?;
        tracing::info!("Cleared {} dead jobs from DLQ", deleted);
        Ok(deleted)
    }

    /// Permanently delete dead jobs last updated more than `days` days ago.
    pub async fn clear_older_than(&self, days: i64) -> AppResult<usize> {
        let cutoff = queuectl_entity::job::model::now() - chrono::Duration::days(days);
        let ids: Vec<JobId> = self
            .dead_jobs()
            .await
            .into_iter()
            .filter(|job| job.updated_at < cutoff)
            .map(|job| job.id)
            .collect();

        let deleted = self.delete_many(&ids).await?;
        tracing::info!("Cleared {} dead jobs older than {} days", deleted, days);
        Ok(deleted)
    }

    /// Aggregate statistics over the DLQ.
    pub async fn statistics(&self) -> DlqStatistics {
        let dead = self.dead_jobs().await;

        let oldest = dead.iter().map(|job| job.updated_at).min();
        let newest = dead.iter().map(|job| job.updated_at).max();
        let timeout_errors = dead
            .iter()
            .filter(|job| {
                job.error_message
                    .as_ref()
                    .is_some_and(|e| e.to_lowercase().contains("timeout"))
            })
            .count() as u64;

        DlqStatistics {
            total: dead.len() as u64,
            oldest,
            newest,
            timeout_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use queuectl_core::config::QueueConfig;

    use super::*;

    async fn dlq_in(dir: &tempfile::TempDir) -> (Arc<JobQueue>, DlqManager) {
        let store = Arc::new(
            JobStore::open(dir.path().join("jobs.json"))
                .await
                .expect("open store"),
        );
        let queue = Arc::new(JobQueue::new(Arc::clone(&store), &QueueConfig::default()));
        let dlq = DlqManager::new(store, Arc::clone(&queue));
        (queue, dlq)
    }

    async fn kill_job(queue: &JobQueue, command: &str, reason: &str) -> JobId {
        let id = queue.enqueue(command, Some(0)).await.expect("enqueue");
        queue
            .dequeue(Duration::from_millis(100))
            .await
            .expect("dequeue");
        queue.fail(id, reason).await.expect("fail");
        id
    }

    #[tokio::test]
    async fn test_retry_preserves_audit_trail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, dlq) = dlq_in(&dir).await;

        let id = kill_job(&queue, "false", "exit 1").await;
        assert!(dlq.contains(id).await);

        assert!(dlq.retry(id).await.expect("retry"));

        // The dead original and the fresh pending copy coexist.
        let all = queue.all_jobs().await;
        assert_eq!(all.len(), 2);
        let dead = all.iter().find(|job| job.state == JobState::Dead).expect("dead");
        let fresh = all
            .iter()
            .find(|job| job.state == JobState::Pending)
            .expect("pending");
        assert_eq!(dead.id, id);
        assert_ne!(fresh.id, id);
        assert_eq!(fresh.command, dead.command);
    }

    #[tokio::test]
    async fn test_retry_rejects_non_dead_jobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, dlq) = dlq_in(&dir).await;

        let pending = queue.enqueue("echo hi", None).await.expect("enqueue");
        assert!(!dlq.retry(pending).await.expect("retry"));
        assert!(!dlq.retry(JobId::new()).await.expect("retry"));
    }

    #[tokio::test]
    async fn test_retry_all_and_many() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, dlq) = dlq_in(&dir).await;

        let a = kill_job(&queue, "false", "exit 1").await;
        let _b = kill_job(&queue, "false", "exit 1").await;

        assert_eq!(dlq.retry_many(&[a, JobId::new()]).await.expect("many"), 1);
        assert_eq!(dlq.retry_all().await.expect("all"), 2);
    }

    #[tokio::test]
    async fn test_find_and_retry_by_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, dlq) = dlq_in(&dir).await;

        kill_job(&queue, "sleep 99", "Job timed out after 1 seconds").await;
        kill_job(&queue, "false", "Command failed with exit code 1").await;

        assert_eq!(dlq.find_by_error("TIMED OUT").await.len(), 1);
        assert_eq!(dlq.retry_by_error("timed out").await.expect("retry"), 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear_all() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, dlq) = dlq_in(&dir).await;

        let a = kill_job(&queue, "false", "exit 1").await;
        kill_job(&queue, "false", "exit 1").await;
        let pending = queue.enqueue("echo keep", None).await.expect("enqueue");

        assert!(dlq.delete(a).await.expect("delete"));
        assert!(!dlq.delete(pending).await.expect("delete"), "only dead jobs");

        assert_eq!(dlq.clear_all().await.expect("clear"), 1);
        assert!(dlq.is_empty().await);
        assert!(queue.get(pending).await.is_some());
    }

    #[tokio::test]
    async fn test_clear_older_than_cutoff() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, dlq) = dlq_in(&dir).await;

        let old = kill_job(&queue, "false", "exit 1").await;
        let recent = kill_job(&queue, "false", "exit 1").await;

        // Age the first record past the cutoff.
        let mut job = queue.get(old).await.expect("found");
        job.updated_at = job.updated_at - chrono::Duration::days(10);
        queue.store().put(job).await.expect("put");

        assert_eq!(dlq.clear_older_than(7).await.expect("clear"), 1);
        assert!(!dlq.contains(old).await);
        assert!(dlq.contains(recent).await);
    }

    #[tokio::test]
    async fn test_statistics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, dlq) = dlq_in(&dir).await;

        let empty = dlq.statistics().await;
        assert_eq!(empty.total, 0);
        assert!(empty.oldest.is_none());
        assert!(empty.newest.is_none());

        kill_job(&queue, "sleep 99", "Job timed out after 5 seconds").await;
        kill_job(&queue, "false", "Command failed with exit code 1").await;

        let stats = dlq.statistics().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.timeout_errors, 1);
        let oldest = stats.oldest.expect("oldest");
        let newest = stats.newest.expect("newest");
        assert!(oldest <= newest);
    }

    #[tokio::test]
    async fn test_pagination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, dlq) = dlq_in(&dir).await;

        for _ in 0..5 {
            kill_job(&queue, "false", "exit 1").await;
        }

        assert_eq!(dlq.dead_jobs_page(0, 2).await.len(), 2);
        assert_eq!(dlq.dead_jobs_page(4, 2).await.len(), 1);
        assert_eq!(dlq.dead_jobs_page(10, 2).await.len(), 0);
    }
}
