//! SyncWatch CLI - Command-line front end for the monitoring engine
//!
//! Provides commands for:
//! - Watching a local directory listing
//! - Watching a cloud-backed directory subtree
//! - Following the download progress of individual files
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use syncwatch_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    cloud::CloudCommand, config::ConfigCommand, local::LocalCommand, progress::ProgressCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "syncwatch",
    version,
    about = "Watch directories and download progress of cloud-backed files"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the listing of a local directory whenever it changes
    Local(LocalCommand),
    /// Report additions, changes, removals and progress below a cloud directory
    Cloud(CloudCommand),
    /// Follow the download progress of one or more files
    Progress(ProgressCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load_or_default(&config_path),
    };

    // Diagnostics go to stderr so stdout stays parseable
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Local(cmd) => {
            ensure_valid(&config)?;
            cmd.execute(format, config).await
        }
        Commands::Cloud(cmd) => {
            ensure_valid(&config)?;
            cmd.execute(format, config).await
        }
        Commands::Progress(cmd) => {
            ensure_valid(&config)?;
            cmd.execute(format, config).await
        }
        Commands::Config(cmd) => cmd.execute(format, &config_path).await,
    }
}

/// Refuses to start monitoring with a configuration that fails validation
fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
    anyhow::bail!("Invalid configuration: {}", listed.join("; "))
}
