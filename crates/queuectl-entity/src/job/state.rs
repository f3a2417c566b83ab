//! Job state enumeration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting in the queue for a worker.
    Pending,
    /// Currently being executed by a worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Failed, scheduled for a later retry.
    Failed,
    /// Exhausted its retry budget; only operator action re-runs it.
    Dead,
}

impl JobState {
    /// Check if the state is terminal for the original job id.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            other => Err(format!(
                "unknown state '{other}' (expected pending|processing|completed|failed|dead)"
            )),
        }
    }
}

/// All job states, in display order.
pub const ALL_STATES: [JobState; 5] = [
    JobState::Pending,
    JobState::Processing,
    JobState::Completed,
    JobState::Failed,
    JobState::Dead,
];
