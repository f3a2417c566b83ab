//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use queuectl_core::config::ConfigManager;
use queuectl_core::result::AppResult;

use crate::output;

use super::Cli;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Set a configuration parameter
    Set {
        /// Configuration key (e.g. max_retries, backoff_base, worker_count)
        key: String,
        /// New value for the parameter
        value: String,
    },
    /// Reload configuration from file
    Reload,
}

/// Execute config commands
pub async fn execute(args: &ConfigArgs, cli: &Cli) -> AppResult<()> {
    let mut manager = ConfigManager::open(&cli.config)?;

    match &args.command {
        ConfigCommand::Show => {
            let config = manager.config();

            if cli.format.is_json() {
                return output::json(config);
            }

            output::heading("Current Configuration");
            output::field("Max Retries", config.max_retries);
            output::field("Backoff Base", config.backoff_base);
            output::field("Worker Count", config.worker_count);
            output::field("Data File", &config.data_file);
            output::field("Job Timeout (s)", config.job_timeout_seconds);
            output::field("Retry Interval (s)", config.retry_check_interval_seconds);
            println!("\nConfiguration File: {}", manager.path().display());
        }
        ConfigCommand::Set { key, value } => {
            manager.set(key, value)?;
            println!("{key} updated to {value}");
        }
        ConfigCommand::Reload => {
            manager.reload()?;
            println!("Configuration reloaded from '{}'", manager.path().display());
        }
    }

    Ok(())
}
