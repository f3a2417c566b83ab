//! Worker management CLI commands.

use clap::{Args, Subcommand};

use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;
use queuectl_worker::WorkerPool;

use crate::output;

use super::{AppContext, Cli};

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Start workers in the foreground (Ctrl+C stops them gracefully)
    Start {
        /// Number of workers to start (default: from config)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Stop worker processes
    Stop,
    /// Show worker status
    Status,
}

/// Execute worker commands
pub async fn execute(args: &WorkerArgs, cli: &Cli) -> AppResult<()> {
    match &args.command {
        WorkerCommand::Start { count } => {
            let ctx = AppContext::init(cli).await?;
            let pool = WorkerPool::new(ctx.queue.clone(), ctx.config.clone());

            pool.start(*count).await?;
            println!("Workers started successfully");
            output::field("Total Workers", pool.worker_count().await);
            output::field("Data File", &ctx.config.data_file);
            println!("Press Ctrl+C to stop workers...");

            tokio::signal::ctrl_c()
                .await
                .map_err(|e| AppError::internal(format!("Failed to wait for Ctrl+C: {e}")))?;

            println!("\nShutdown signal received, stopping workers...");
            pool.stop().await;
            println!("Workers stopped successfully");
        }
        WorkerCommand::Stop => {
            // Workers are owned by the foreground `worker start` process.
            println!("No workers are running in this process");
            println!("Stop the foreground 'queuectl worker start' process with Ctrl+C.");
        }
        WorkerCommand::Status => {
            let ctx = AppContext::init(cli).await?;
            let stats = ctx.store.statistics().await;

            println!("Worker Status:");
            output::field("Running (this process)", false);
            output::field("Pending Jobs", stats.pending);
            output::field("Processing Jobs", stats.processing);
            output::field("Configured Workers", ctx.config.worker_count);
            println!("Workers run in the foreground of 'queuectl worker start'.");
        }
    }

    Ok(())
}
