//! List jobs by state or criteria.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use queuectl_core::result::AppResult;
use queuectl_entity::job::{Job, JobState};

use crate::output;

use super::{AppContext, Cli};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const COMMAND_WIDTH: usize = 50;

/// Arguments for the list command
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Filter by job state (pending|processing|completed|failed|dead)
    #[arg(short, long, value_parser = parse_state)]
    pub state: Option<JobState>,

    /// Limit number of results
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,

    /// Offset for pagination
    #[arg(short, long, default_value_t = 0)]
    pub offset: usize,

    /// Show detailed job information
    #[arg(long)]
    pub verbose: bool,
}

fn parse_state(s: &str) -> Result<JobState, String> {
    s.parse()
}

#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "ATTEMPTS")]
    attempts: String,
    #[tabled(rename = "COMMAND")]
    command: String,
}

#[derive(Debug, Serialize, Tabled)]
struct VerboseJobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "ATTEMPTS")]
    attempts: String,
    #[tabled(rename = "COMMAND")]
    command: String,
    #[tabled(rename = "CREATED")]
    created: String,
    #[tabled(rename = "UPDATED")]
    updated: String,
    #[tabled(rename = "ERROR")]
    error: String,
    #[tabled(rename = "NEXT RETRY")]
    next_retry: String,
}

/// Execute the list command
pub async fn execute(args: &ListArgs, cli: &Cli) -> AppResult<()> {
    let ctx = AppContext::init(cli).await?;

    let jobs = match args.state {
        Some(state) => ctx.queue.jobs_by_state(state).await,
        None => ctx.queue.all_jobs().await,
    };
    let total = jobs.len();
    let page: Vec<Job> = jobs
        .into_iter()
        .skip(args.offset)
        .take(args.limit)
        .collect();

    if cli.format.is_json() {
        return output::json(&page);
    }

    if page.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    match args.state {
        Some(state) => println!("Jobs with state: {state}"),
        None => println!("All jobs:"),
    }
    println!(
        "Showing {}-{} of {} jobs\n",
        args.offset + 1,
        args.offset + page.len(),
        total
    );

    if args.verbose {
        let rows: Vec<VerboseJobRow> = page.iter().map(verbose_row).collect();
        println!("{}", tabled::Table::new(&rows));
    } else {
        let rows: Vec<JobRow> = page.iter().map(row).collect();
        println!("{}", tabled::Table::new(&rows));
    }

    if total > args.offset + page.len() {
        println!("\nMore results available (use --offset and --limit for pagination)");
    }
    Ok(())
}

fn row(job: &Job) -> JobRow {
    JobRow {
        id: job.id.to_string(),
        state: job.state.to_string(),
        attempts: format!("{}/{}", job.attempts, job.max_retries),
        command: output::truncate(&job.command, COMMAND_WIDTH),
    }
}

fn verbose_row(job: &Job) -> VerboseJobRow {
    VerboseJobRow {
        id: job.id.to_string(),
        state: job.state.to_string(),
        attempts: format!("{}/{}", job.attempts, job.max_retries),
        command: output::truncate(&job.command, COMMAND_WIDTH),
        created: job.created_at.format(TIME_FORMAT).to_string(),
        updated: job.updated_at.format(TIME_FORMAT).to_string(),
        error: job.error_message.clone().unwrap_or_default(),
        next_retry: job
            .next_retry_at
            .map(|at| at.format(TIME_FORMAT).to_string())
            .unwrap_or_default(),
    }
}
