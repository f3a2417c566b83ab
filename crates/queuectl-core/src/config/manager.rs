//! Configuration loading, mutation, and persistence.

use std::path::{Path, PathBuf};

use tracing;

use crate::error::AppError;
use crate::result::AppResult;

use super::QueueConfig;

/// Manages the configuration file for the queue.
///
/// A missing file is created with defaults on first open. Reads go through
/// the `config` crate so values can be overridden with `QUEUECTL_*`
/// environment variables; writes (`set`) persist the plain JSON document.
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    current: QueueConfig,
}

impl ConfigManager {
    /// Open the configuration at `path`, creating it with defaults when absent.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();

        if !path.exists() {
            tracing::info!(
                "Configuration file '{}' not found, creating with defaults",
                path.display()
            );
            write_config(&path, &QueueConfig::default())?;
        }

        let current = load_config(&path)?;
        tracing::debug!("Configuration loaded from '{}'", path.display());

        Ok(Self { path, current })
    }

    /// The effective configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.current
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Update a single configuration key and persist the result.
    ///
    /// Keys are accepted in `snake_case` or `kebab-case`. Unknown keys and
    /// unparseable values are validation errors; nothing is written in that
    /// case.
    pub fn set(&mut self, key: &str, value: &str) -> AppResult<()> {
        let mut updated = self.current.clone();

        match key.replace('-', "_").as_str() {
            "max_retries" => {
                updated.max_retries = parse_value(key, value)?;
            }
            "backoff_base" => {
                let base: u32 = parse_value(key, value)?;
                if base < 1 {
                    return Err(AppError::validation("backoff_base must be positive"));
                }
                updated.backoff_base = base;
            }
            "worker_count" => {
                let count: usize = parse_value(key, value)?;
                if count < 1 {
                    return Err(AppError::validation("worker_count must be positive"));
                }
                updated.worker_count = count;
            }
            "data_file" => {
                if value.trim().is_empty() {
                    return Err(AppError::validation("data_file cannot be empty"));
                }
                updated.data_file = value.to_string();
            }
            "job_timeout_seconds" => {
                let timeout: u64 = parse_value(key, value)?;
                if timeout < 1 {
                    return Err(AppError::validation("job_timeout_seconds must be positive"));
                }
                updated.job_timeout_seconds = timeout;
            }
            "retry_check_interval_seconds" => {
                let interval: u64 = parse_value(key, value)?;
                if interval < 1 {
                    return Err(AppError::validation(
                        "retry_check_interval_seconds must be positive",
                    ));
                }
                updated.retry_check_interval_seconds = interval;
            }
            other => {
                return Err(AppError::validation(format!(
                    "Unknown configuration key '{other}'"
                )));
            }
        }

        write_config(&self.path, &updated)?;
        self.current = updated;
        tracing::info!("Configuration updated: {} = {}", key, value);
        Ok(())
    }

    /// Re-read the configuration from disk, discarding in-memory state.
    pub fn reload(&mut self) -> AppResult<()> {
        self.current = load_config(&self.path)?;
        tracing::info!("Configuration reloaded from '{}'", self.path.display());
        Ok(())
    }

    /// Persist the current configuration.
    pub fn save(&self) -> AppResult<()> {
        write_config(&self.path, &self.current)
    }
}

fn load_config(path: &Path) -> AppResult<QueueConfig> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Json))
        .add_source(config::Environment::with_prefix("QUEUECTL").try_parsing(true))
        .build()
        .map_err(|e| {
            AppError::configuration(format!(
                "Failed to read config '{}': {e}",
                path.display()
            ))
        })?;

    config.try_deserialize().map_err(|e| {
        AppError::configuration(format!(
            "Failed to parse config '{}': {e}",
            path.display()
        ))
    })
}

fn write_config(path: &Path, config: &QueueConfig) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    tracing::debug!("Configuration saved to '{}'", path.display());
    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|_| AppError::validation(format!("Invalid value '{value}' for {key}")))
}
