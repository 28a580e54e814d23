//! Local command - Print a directory listing whenever it changes
//!
//! Provides the `syncwatch local <dir>` CLI command which:
//! 1. Prints the initial listing of the directory's immediate children
//! 2. Prints a fresh listing after every create, delete, rename or write
//! 3. Runs until interrupted

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use syncwatch_core::config::Config;
use syncwatch_core::domain::{DirectorySnapshot, WatchedResource};
use syncwatch_monitor::MonitorEngine;
use tokio::runtime::Handle;
use tracing::info;

use super::{absolute_path, wait_for_shutdown};
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Local directory watch
#[derive(Debug, Args)]
pub struct LocalCommand {
    /// Directory to watch
    pub dir: PathBuf,
}

impl LocalCommand {
    pub async fn execute(&self, format: OutputFormat, config: Config) -> Result<()> {
        let formatter: Arc<dyn OutputFormatter> =
            Arc::from(get_formatter(matches!(format, OutputFormat::Json)));
        let dir = absolute_path(&self.dir)?;

        let engine = MonitorEngine::with_xattr_search(
            WatchedResource::new(&dir)?,
            config,
            Handle::current(),
        );

        let sink = Arc::clone(&formatter);
        let handle = engine.watch_local_directory(&dir, move |listing| match listing {
            Ok(snapshot) => {
                sink.event(&listing_summary(&snapshot), listing_json(&snapshot));
            }
            Err(e) => sink.error(&e.to_string()),
        })?;

        info!(dir = %dir.display(), "Watching local directory");
        formatter.info(&format!("Watching {} (Ctrl+C to stop)", dir.display()));

        wait_for_shutdown().await;
        handle.cancel();
        Ok(())
    }
}

fn listing_summary(snapshot: &DirectorySnapshot) -> String {
    let mut summary = format!(
        "{}{}: {} item{}",
        snapshot.directory.display(),
        if snapshot.is_initial_fetch { " (initial)" } else { "" },
        snapshot.children.len(),
        if snapshot.children.len() == 1 { "" } else { "s" },
    );
    for child in &snapshot.children {
        let name = child.file_name().unwrap_or(child.as_os_str());
        summary.push_str(&format!("\n    {}", name.to_string_lossy()));
    }
    summary
}

fn listing_json(snapshot: &DirectorySnapshot) -> serde_json::Value {
    serde_json::json!({
        "event": "listing",
        "directory": snapshot.directory.display().to_string(),
        "initial": snapshot.is_initial_fetch,
        "children": snapshot
            .children
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>(),
    })
}
