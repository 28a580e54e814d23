//! Config command - View and validate SyncWatch configuration
//!
//! Provides the `syncwatch config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use syncwatch_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

/// Outcome of checking a configuration file
#[derive(Debug, PartialEq)]
enum Validation {
    Missing,
    Unparseable(String),
    Checked(Vec<String>),
}

impl ConfigCommand {
    /// Execute the config command against the file at `config_path`
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(format, config_path),
            ConfigCommand::Validate => execute_validate(format, config_path),
        }
    }
}

fn execute_show(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if matches!(format, OutputFormat::Json) {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }

    Ok(())
}

fn validate_file(config_path: &Path) -> Validation {
    // Load explicitly so parse errors surface instead of falling back to defaults
    match Config::load(config_path) {
        Ok(config) => Validation::Checked(config.validate().iter().map(|e| e.to_string()).collect()),
        Err(_) if !config_path.exists() => Validation::Missing,
        Err(e) => Validation::Unparseable(e.to_string()),
    }
}

fn execute_validate(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let path = config_path.display().to_string();

    info!(config_path = %path, "Validating configuration");

    match validate_file(config_path) {
        Validation::Missing => {
            if matches!(format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path,
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.info(&format!("Configuration file not found at {}", path));
                formatter.info("Using default configuration.");
            }
        }
        Validation::Unparseable(reason) => {
            if matches!(format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path,
                    "errors": [format!("Failed to parse configuration: {}", reason)],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {}", reason));
                formatter.info(&format!("File: {}", path));
            }
        }
        Validation::Checked(errors) => {
            if matches!(format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "valid": errors.is_empty(),
                    "config_path": path,
                    "errors": errors,
                }));
            } else if errors.is_empty() {
                formatter.success("Configuration is valid");
                formatter.info(&format!("File: {}", path));
            } else {
                formatter.error(&format!(
                    "Configuration has {} error{}:",
                    errors.len(),
                    if errors.len() == 1 { "" } else { "s" }
                ));
                formatter.info(&format!("File: {}", path));
                formatter.info("");
                for error in &errors {
                    formatter.info(&format!("  {}", error));
                }
            }
        }
    }

    Ok(())
}
