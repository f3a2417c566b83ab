//! Show overall system status.

use queuectl_core::result::AppResult;

use crate::output;

use super::{AppContext, Cli};

/// Execute the status command
pub async fn execute(cli: &Cli) -> AppResult<()> {
    let ctx = AppContext::init(cli).await?;
    let stats = ctx.store.statistics().await;

    if cli.format.is_json() {
        let report = serde_json::json!({
            "statistics": stats,
            "total_jobs": stats.total(),
            "pending_in_channel": ctx.queue.pending_in_channel(),
            "config_file": cli.config,
            "config": ctx.config,
        });
        return output::json(&report);
    }

    output::heading("Job Queue System Status");

    println!("\nJob Statistics:");
    output::field("Pending", stats.pending);
    output::field("Processing", stats.processing);
    output::field("Completed", stats.completed);
    output::field("Failed", stats.failed);
    output::field("Dead", stats.dead);
    output::field("Total", stats.total());

    println!("\nQueue Status:");
    output::field("Pending in Channel", ctx.queue.pending_in_channel());

    println!("\nConfiguration:");
    output::field("Config File", &cli.config);
    output::field("Data File", &ctx.config.data_file);
    output::field("Max Retries", ctx.config.max_retries);
    output::field("Backoff Base", ctx.config.backoff_base);
    output::field("Worker Count", ctx.config.worker_count);
    output::field("Job Timeout (s)", ctx.config.job_timeout_seconds);
    output::field("Retry Interval (s)", ctx.config.retry_check_interval_seconds);

    Ok(())
}
