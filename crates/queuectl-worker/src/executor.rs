//! Shell command execution with timeout and output capture.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing;

use queuectl_entity::job::Job;

/// Outcome of a single command execution.
///
/// Execution failures are domain data carried back to the coordinator, not
/// errors; `execute` itself is infallible.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// Failure reason, set when `success` is false.
    pub error_message: Option<String>,
    /// Merged stdout/stderr capture. Logged, never persisted.
    pub output: String,
    /// Exit code when the process ran to completion.
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the execution.
    pub duration: Duration,
}

/// Runs job commands through the host shell.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    timeout: Duration,
}

impl ShellExecutor {
    /// Create an executor with the given per-job timeout.
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    /// Execute a job's command and map the outcome.
    ///
    /// The child inherits the parent's environment and working directory.
    /// On timeout the in-flight future is dropped, which kills the child
    /// via `kill_on_drop`.
    pub async fn execute(&self, job: &Job) -> ExecutionResult {
        let start = std::time::Instant::now();
        tracing::info!("Executing job {}: {}", job.id, job.command);

        let mut cmd = shell_command(&job.command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let duration = start.elapsed();
                let merged = merge_output(&output.stdout, &output.stderr);
                let exit_code = output.status.code();

                if output.status.success() {
                    tracing::info!(
                        "Job {} completed successfully in {}ms",
                        job.id,
                        duration.as_millis()
                    );
                    ExecutionResult {
                        success: true,
                        error_message: None,
                        output: merged,
                        exit_code,
                        duration,
                    }
                } else {
                    let code = exit_code.unwrap_or(-1);
                    tracing::warn!("Job {} failed with exit code {}", job.id, code);
                    ExecutionResult {
                        success: false,
                        error_message: Some(format!("Command failed with exit code {code}")),
                        output: merged,
                        exit_code,
                        duration,
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::error!("Job {} failed to start: {}", job.id, e);
                ExecutionResult {
                    success: false,
                    error_message: Some(format!("Failed to start process: {e}")),
                    output: String::new(),
                    exit_code: None,
                    duration: start.elapsed(),
                }
            }
            Err(_) => {
                let seconds = self.timeout.as_secs();
                tracing::warn!("Job {} timed out after {}s: {}", job.id, seconds, job.command);
                ExecutionResult {
                    success: false,
                    error_message: Some(format!("Job timed out after {seconds} seconds")),
                    output: String::new(),
                    exit_code: None,
                    duration: start.elapsed(),
                }
            }
        }
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.arg("/c").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut merged = String::from_utf8_lossy(stdout).trim_end().to_string();
    let err = String::from_utf8_lossy(stderr);
    let err = err.trim_end();
    if !err.is_empty() {
        if !merged.is_empty() {
            merged.push('\n');
        }
        merged.push_str(err);
    }
    merged
}
