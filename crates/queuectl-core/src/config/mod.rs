//! Application configuration schema.
//!
//! The configuration lives in a single JSON document (`config.json` by
//! default) and is deserialized via the `config` crate so that every key
//! can also be overridden through the `QUEUECTL_` environment prefix.

pub mod manager;

use serde::{Deserialize, Serialize};

pub use self::manager::ConfigManager;

/// Job queue configuration.
///
/// Every field has a default so a partially-written file (or an absent one)
/// still yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Default retry budget for newly enqueued jobs.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the exponential backoff (delay = base^attempts seconds).
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,
    /// Number of workers started by `worker start`.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Path of the durable jobs file.
    #[serde(default = "default_data_file")]
    pub data_file: String,
    /// Wall-clock timeout for a single command execution.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
    /// Interval between retry scheduler ticks.
    #[serde(default = "default_retry_check_interval")]
    pub retry_check_interval_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            worker_count: default_worker_count(),
            data_file: default_data_file(),
            job_timeout_seconds: default_job_timeout(),
            retry_check_interval_seconds: default_retry_check_interval(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u32 {
    2
}

fn default_worker_count() -> usize {
    3
}

fn default_data_file() -> String {
    "jobs.json".to_string()
}

fn default_job_timeout() -> u64 {
    300
}

fn default_retry_check_interval() -> u64 {
    30
}
