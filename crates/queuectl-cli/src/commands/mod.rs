//! CLI command definitions and dispatch.

pub mod config;
pub mod dlq;
pub mod enqueue;
pub mod list;
pub mod status;
pub mod worker;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use queuectl_core::config::{ConfigManager, QueueConfig};
use queuectl_core::result::AppResult;
use queuectl_store::JobStore;
use queuectl_worker::{DlqManager, JobQueue};

use crate::output::OutputFormat;

/// queuectl, a durable local job queue
#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json", global = true)]
    pub config: String,

    /// Data file path (overrides config)
    #[arg(short, long, global = true)]
    pub data: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a new job to the queue
    Enqueue(enqueue::EnqueueArgs),
    /// Manage worker processes
    Worker(worker::WorkerArgs),
    /// Show job queue system status
    Status,
    /// List jobs by state or criteria
    List(list::ListArgs),
    /// Manage the dead letter queue (failed jobs)
    Dlq(dlq::DlqArgs),
    /// Manage system configuration
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> AppResult<()> {
        match &self.command {
            Commands::Enqueue(args) => enqueue::execute(args, self).await,
            Commands::Worker(args) => worker::execute(args, self).await,
            Commands::Status => status::execute(self).await,
            Commands::List(args) => list::execute(args, self).await,
            Commands::Dlq(args) => dlq::execute(args, self).await,
            Commands::Config(args) => config::execute(args, self).await,
        }
    }
}

/// Explicitly constructed application context threaded through the commands
/// that touch the job store. Built fresh per invocation; no process-wide
/// statics.
pub struct AppContext {
    pub config: QueueConfig,
    pub store: Arc<JobStore>,
    pub queue: Arc<JobQueue>,
}

impl AppContext {
    /// Load configuration, open the store and wire the coordinator.
    pub async fn init(cli: &Cli) -> AppResult<Self> {
        let manager = ConfigManager::open(&cli.config)?;
        let mut config = manager.config().clone();
        if let Some(data) = &cli.data {
            config.data_file = data.clone();
        }

        let store = Arc::new(JobStore::open(&config.data_file).await?);
        let queue = Arc::new(JobQueue::new(Arc::clone(&store), &config));
        queue.initialize().await;

        Ok(Self { config, store, queue })
    }

    /// Dead-letter manager over this context's store and coordinator.
    pub fn dlq(&self) -> DlqManager {
        DlqManager::new(Arc::clone(&self.store), Arc::clone(&self.queue))
    }
}
