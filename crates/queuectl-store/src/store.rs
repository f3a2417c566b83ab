//! Durable job store backed by a single JSON snapshot file.
//!
//! The in-memory map and the file are guarded by one RwLock; every mutating
//! operation rewrites the full snapshot to a `.tmp` sibling and atomically
//! renames it over the data file before returning. After a crash the file
//! reflects either the pre- or post-mutation state, never a torn write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing;

use queuectl_core::error::{AppError, ErrorKind};
use queuectl_core::result::AppResult;
use queuectl_core::types::JobId;
use queuectl_entity::job::{Job, JobState};

/// Durable, thread-safe mapping from job id to job record.
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    /// Open the store at `path`, loading any existing records.
    ///
    /// An absent or empty file yields an empty store. A non-empty file that
    /// does not parse is a fatal storage error; the operator must intervene.
    /// Records found in `processing` (left over from a crashed run) are
    /// reset to `pending` and the reconciled snapshot is written back.
    pub async fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let mut jobs = HashMap::new();
        let mut reconciled = 0usize;

        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read jobs file '{}'", path.display()),
                    e,
                )
            })?;

            if !content.trim().is_empty() {
                let records: Vec<Job> = serde_json::from_str(&content).map_err(|e| {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("Jobs file '{}' is malformed", path.display()),
                        e,
                    )
                })?;

                for mut job in records {
                    if job.state == JobState::Processing {
                        // A crashed run never reported this attempt; requeue it.
                        job.reset_for_retry();
                        reconciled += 1;
                    }
                    if let Some(previous) = jobs.insert(job.id, job) {
                        tracing::warn!("Duplicate job id {} in jobs file", previous.id);
                    }
                }
            }
        }

        let store = Self {
            path,
            jobs: RwLock::new(jobs),
        };

        {
            let jobs = store.jobs.read().await;
            tracing::info!(
                "Loaded {} jobs from '{}'",
                jobs.len(),
                store.path.display()
            );
        }

        if reconciled > 0 {
            tracing::info!("Reset {} stale processing jobs to pending", reconciled);
            let jobs = store.jobs.write().await;
            store.write_snapshot(&jobs).await?;
        }

        Ok(store)
    }

    /// Upsert a record and flush the snapshot.
    pub async fn put(&self, job: Job) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job);
        self.write_snapshot(&jobs).await
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Snapshot of all records, ordered by creation time.
    pub async fn all(&self) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        sorted(jobs.values().cloned().collect())
    }

    /// Snapshot of all records in the given state.
    pub async fn list_by_state(&self, state: JobState) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        sorted(
            jobs.values()
                .filter(|job| job.state == state)
                .cloned()
                .collect(),
        )
    }

    /// Failed records with retry budget left whose backoff delay has elapsed.
    pub async fn list_ready_for_retry(&self, now: NaiveDateTime) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        sorted(
            jobs.values()
                .filter(|job| job.can_retry() && job.is_ready_for_retry(now))
                .cloned()
                .collect(),
        )
    }

    /// Remove a record. Returns whether it existed; flushes when it did.
    pub async fn delete(&self, id: JobId) -> AppResult<bool> {
        let mut jobs = self.jobs.write().await;
        if jobs.remove(&id).is_none() {
            return Ok(false);
        }
        self.write_snapshot(&jobs).await?;
        Ok(true)
    }

    /// Remove every record in the given state with a single snapshot write.
    pub async fn delete_by_state(&self, state: JobState) -> AppResult<usize> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.state != state);
        let deleted = before - jobs.len();

        if deleted > 0 {
            self.write_snapshot(&jobs).await?;
            tracing::info!("Deleted {} jobs with state {}", deleted, state);
        }
        Ok(deleted)
    }

    /// Per-state record counts.
    pub async fn statistics(&self) -> JobStatistics {
        let jobs = self.jobs.read().await;
        let mut stats = JobStatistics::default();
        for job in jobs.values() {
            match job.state {
                JobState::Pending => stats.pending += 1,
                JobState::Processing => stats.processing += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Dead => stats.dead += 1,
            }
        }
        stats
    }

    /// Total number of records.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Path of the data file.
    pub fn data_file(&self) -> &Path {
        &self.path
    }

    /// Serialize the full record set to `<path>.tmp`, then rename over the
    /// data file. Called with the write lock held so the map and the file
    /// cannot diverge.
    async fn write_snapshot(&self, jobs: &HashMap<JobId, Job>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let records = sorted(jobs.values().cloned().collect());
        let json = serde_json::to_string_pretty(&records)?;

        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write '{}'", tmp.display()),
                e,
            )
        })?;

        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to replace '{}'", self.path.display()),
                e,
            )
        })?;

        tracing::debug!(
            "Persisted {} jobs to '{}'",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Per-state job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
}

impl JobStatistics {
    /// Total record count across all states.
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.dead
    }

    /// Count for a single state.
    pub fn count(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn sorted(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
    });
    jobs
}
