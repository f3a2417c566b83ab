//! Enqueue a new job.

use clap::Args;

use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;

use crate::output;

use super::{AppContext, Cli};

/// Arguments for the enqueue command
#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Job specification: a plain command string, or a JSON object with a
    /// required `command` field and optional `max_retries`
    pub job_spec: String,

    /// Maximum number of retries (overrides the config default)
    #[arg(short = 'r', long)]
    pub max_retries: Option<u32>,
}

/// Execute the enqueue command
pub async fn execute(args: &EnqueueArgs, cli: &Cli) -> AppResult<()> {
    let ctx = AppContext::init(cli).await?;

    let mut max_retries = args.max_retries;
    let command = if args.job_spec.trim_start().starts_with('{') {
        let spec: serde_json::Value = serde_json::from_str(&args.job_spec)
            .map_err(|e| AppError::validation(format!("Invalid JSON job specification: {e}")))?;

        let command = spec
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::validation("JSON job specification must contain a 'command' field")
            })?
            .to_string();

        if let Some(value) = spec.get("max_retries") {
            let retries = value.as_u64().ok_or_else(|| {
                AppError::validation("max_retries must be a non-negative integer")
            })?;
            max_retries = Some(retries as u32);
        }
        command
    } else {
        args.job_spec.clone()
    };

    let id = ctx.queue.enqueue(&command, max_retries).await?;

    println!("Job enqueued successfully:");
    output::field("Job ID", id);
    output::field("Command", &command);
    output::field("Max Retries", max_retries.unwrap_or(ctx.config.max_retries));
    Ok(())
}
