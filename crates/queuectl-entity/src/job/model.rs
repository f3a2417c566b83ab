//! Job entity model.

use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use queuectl_core::types::JobId;

use super::state::JobState;

/// A queued shell command.
///
/// The record is the durable unit of the system; every state change goes
/// through one of the transition methods so the timestamp and the
/// state-dependent fields stay consistent. Timestamps are local date-times
/// without timezone, matching the on-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// The shell command to execute.
    pub command: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// Number of completed execution attempts that failed.
    pub attempts: u32,
    /// Retry budget (0 = single try).
    pub max_retries: u32,
    /// When the job was created.
    pub created_at: NaiveDateTime,
    /// When the job last changed state.
    pub updated_at: NaiveDateTime,
    /// Reason for the latest failure.
    pub error_message: Option<String>,
    /// Earliest instant at which a failed job may be requeued.
    pub next_retry_at: Option<NaiveDateTime>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(command: impl Into<String>, max_retries: u32) -> Self {
        let now = now();
        Self {
            id: JobId::new(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            error_message: None,
            next_retry_at: None,
        }
    }

    /// Transition to `Processing` when a worker claims the job.
    pub fn mark_processing(&mut self) {
        self.state = JobState::Processing;
        self.updated_at = now();
    }

    /// Transition to `Completed`, clearing failure bookkeeping.
    pub fn mark_completed(&mut self) {
        self.state = JobState::Completed;
        self.updated_at = now();
        self.error_message = None;
        self.next_retry_at = None;
    }

    /// Record a failed attempt that still has retry budget left.
    ///
    /// `next_retry_at` is derived from the new `updated_at`, so the stored
    /// gap between the two is exactly the backoff delay.
    pub fn mark_failed(&mut self, error_message: impl Into<String>, retry_delay: Duration) {
        self.state = JobState::Failed;
        self.attempts += 1;
        self.updated_at = now();
        self.error_message = Some(error_message.into());
        self.next_retry_at = Some(self.updated_at + retry_delay);
    }

    /// Record a failed attempt that exhausted the retry budget.
    pub fn mark_dead(&mut self, error_message: impl Into<String>) {
        self.state = JobState::Dead;
        self.attempts += 1;
        self.updated_at = now();
        self.error_message = Some(error_message.into());
        self.next_retry_at = None;
    }

    /// Requeue a failed job, clearing failure bookkeeping but not `attempts`.
    pub fn reset_for_retry(&mut self) {
        self.state = JobState::Pending;
        self.updated_at = now();
        self.error_message = None;
        self.next_retry_at = None;
    }

    /// Check if the job has retry budget left.
    pub fn can_retry(&self) -> bool {
        self.state == JobState::Failed && self.attempts < self.max_retries
    }

    /// Check if the job's backoff delay has elapsed.
    pub fn is_ready_for_retry(&self, now: NaiveDateTime) -> bool {
        match self.next_retry_at {
            Some(at) => at <= now,
            None => true,
        }
    }
}

/// Current wall-clock time as a local naive date-time.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new("echo hi", 3);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, 3);
        assert!(job.error_message.is_none());
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn test_complete_clears_failure_fields() {
        let mut job = Job::new("echo hi", 3);
        job.mark_processing();
        job.mark_failed("boom", Duration::seconds(2));
        job.mark_completed();

        assert_eq!(job.state, JobState::Completed);
        assert!(job.error_message.is_none());
        assert!(job.next_retry_at.is_none());
        // attempts are history, not state
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn test_failed_sets_retry_hint() {
        let mut job = Job::new("false", 3);
        job.mark_processing();
        job.mark_failed("exit 1", Duration::seconds(2));

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error_message.as_deref(), Some("exit 1"));
        assert_eq!(
            job.next_retry_at,
            Some(job.updated_at + Duration::seconds(2)),
            "the stored gap is exactly the backoff delay"
        );
    }

    #[test]
    fn test_dead_clears_retry_hint() {
        let mut job = Job::new("false", 1);
        job.mark_processing();
        job.mark_dead("exit 1");

        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error_message.as_deref(), Some("exit 1"));
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn test_reset_for_retry() {
        let mut job = Job::new("false", 3);
        job.mark_processing();
        job.mark_failed("exit 1", Duration::seconds(2));
        job.reset_for_retry();

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 1, "requeue must not consume budget");
        assert!(job.error_message.is_none());
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn test_can_retry_boundary() {
        let mut job = Job::new("false", 2);
        job.mark_processing();
        job.mark_failed("1st", Duration::seconds(2));
        assert!(job.can_retry());

        job.mark_processing();
        job.mark_failed("2nd", Duration::seconds(4));
        assert!(!job.can_retry(), "attempts == max_retries exhausts budget");
    }

    #[test]
    fn test_ready_for_retry() {
        let mut job = Job::new("false", 3);
        job.mark_processing();
        job.mark_failed("boom", Duration::seconds(30));

        assert!(!job.is_ready_for_retry(job.updated_at));
        assert!(job.is_ready_for_retry(job.updated_at + Duration::seconds(30)));

        job.next_retry_at = None;
        assert!(
            job.is_ready_for_retry(job.updated_at),
            "missing hint means ready now"
        );
    }

    #[test]
    fn test_serde_wire_format() {
        let job = Job::new("echo hi", 3);
        let json = serde_json::to_value(&job).expect("serialize");

        let object = json.as_object().expect("object");
        for key in [
            "id",
            "command",
            "state",
            "attempts",
            "max_retries",
            "created_at",
            "updated_at",
            "error_message",
            "next_retry_at",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
        assert_eq!(object["state"], "pending");

        let back: Job = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.id, job.id);
        assert_eq!(back.created_at, job.created_at);
    }
}
