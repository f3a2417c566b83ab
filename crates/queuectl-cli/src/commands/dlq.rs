//! Dead letter queue CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;
use queuectl_core::types::JobId;
use queuectl_entity::job::{model, Job};

use crate::output;

use super::{AppContext, Cli};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Arguments for DLQ commands
#[derive(Debug, Args)]
pub struct DlqArgs {
    /// DLQ subcommand
    #[command(subcommand)]
    pub command: DlqCommand,
}

/// DLQ subcommands
#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List jobs in the dead letter queue
    List {
        /// Limit number of results
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        /// Offset for pagination
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
        /// Only show jobs whose error message contains this substring
        #[arg(long)]
        error: Option<String>,
        /// Only show jobs that died within the last N hours
        #[arg(long)]
        since_hours: Option<i64>,
    },
    /// Retry dead jobs (as fresh records; originals are kept)
    Retry {
        /// Job IDs to retry (if none specified, retry all)
        ids: Vec<JobId>,
        /// Retry all dead jobs
        #[arg(long)]
        all: bool,
        /// Retry the jobs whose error message contains this substring
        #[arg(long, conflicts_with = "all")]
        error: Option<String>,
    },
    /// Delete dead jobs permanently
    Delete {
        /// Job IDs to delete
        #[arg(required = true)]
        ids: Vec<JobId>,
    },
    /// Clear the dead letter queue
    Clear {
        /// Only clear jobs older than this many days
        #[arg(long)]
        older_than: Option<i64>,
        /// Confirm the operation
        #[arg(long)]
        confirm: bool,
    },
    /// Show dead letter queue statistics
    Stats,
}

#[derive(Debug, Serialize, Tabled)]
struct DeadJobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "ATTEMPTS")]
    attempts: String,
    #[tabled(rename = "COMMAND")]
    command: String,
    #[tabled(rename = "FAILED AT")]
    failed_at: String,
    #[tabled(rename = "ERROR")]
    error: String,
}

/// Execute DLQ commands
pub async fn execute(args: &DlqArgs, cli: &Cli) -> AppResult<()> {
    let ctx = AppContext::init(cli).await?;
    let dlq = ctx.dlq();

    match &args.command {
        DlqCommand::List {
            limit,
            offset,
            error,
            since_hours,
        } => {
            let mut jobs = match (error, since_hours) {
                (Some(pattern), _) => dlq.find_by_error(pattern).await,
                (None, Some(hours)) => {
                    let now = model::now();
                    dlq.find_by_time_range(now - chrono::Duration::hours(*hours), now)
                        .await
                }
                (None, None) => dlq.dead_jobs().await,
            };
            if error.is_some() {
                if let Some(hours) = since_hours {
                    let cutoff = model::now() - chrono::Duration::hours(*hours);
                    jobs.retain(|job| job.updated_at > cutoff);
                }
            }

            let total = jobs.len();
            let page: Vec<Job> = jobs.into_iter().skip(*offset).take(*limit).collect();

            if cli.format.is_json() {
                return output::json(&page);
            }

            if page.is_empty() {
                println!("No jobs in the dead letter queue");
                return Ok(());
            }

            println!(
                "Dead Letter Queue - Showing {}-{} of {} jobs\n",
                offset + 1,
                offset + page.len(),
                total
            );
            let rows: Vec<DeadJobRow> = page.iter().map(dead_row).collect();
            println!("{}", tabled::Table::new(&rows));
        }
        DlqCommand::Retry { ids, all, error } => {
            let retried = if let Some(pattern) = error {
                println!("Retrying dead jobs with errors matching '{pattern}'...");
                dlq.retry_by_error(pattern).await?
            } else if *all || ids.is_empty() {
                println!("Retrying all dead jobs...");
                dlq.retry_all().await?
            } else {
                println!("Retrying {} specified jobs...", ids.len());
                dlq.retry_many(ids).await?
            };
            println!("Successfully retried {retried} jobs");
        }
        DlqCommand::Delete { ids } => {
            println!("Deleting {} jobs from the DLQ...", ids.len());
            let deleted = dlq.delete_many(ids).await?;
            println!("Successfully deleted {deleted} jobs");
        }
        DlqCommand::Clear {
            older_than,
            confirm,
        } => {
            if !confirm {
                return Err(AppError::validation(
                    "This operation permanently deletes jobs from the DLQ; re-run with --confirm",
                ));
            }

            let deleted = match older_than {
                Some(days) => {
                    println!("Clearing dead jobs older than {days} days...");
                    dlq.clear_older_than(*days).await?
                }
                None => {
                    println!("Clearing all dead jobs...");
                    dlq.clear_all().await?
                }
            };
            println!("Successfully cleared {deleted} jobs from the DLQ");
        }
        DlqCommand::Stats => {
            let stats = dlq.statistics().await;

            if cli.format.is_json() {
                return output::json(&stats);
            }

            output::heading("Dead Letter Queue Statistics");
            output::field("Total Dead Jobs", stats.total);
            if let Some(oldest) = stats.oldest {
                output::field("Oldest Job", oldest.format(TIME_FORMAT));
            }
            if let Some(newest) = stats.newest {
                output::field("Newest Job", newest.format(TIME_FORMAT));
            }
            output::field("Timeout Errors", stats.timeout_errors);
        }
    }

    Ok(())
}

fn dead_row(job: &Job) -> DeadJobRow {
    DeadJobRow {
        id: job.id.to_string(),
        attempts: format!("{}/{}", job.attempts, job.max_retries),
        command: output::truncate(&job.command, 50),
        failed_at: job.updated_at.format(TIME_FORMAT).to_string(),
        error: output::truncate(job.error_message.as_deref().unwrap_or("Unknown"), 40),
    }
}
