//! Progress command - Follow the download progress of files
//!
//! Provides the `syncwatch progress <file>...` CLI command. All files share
//! one progress monitor searching below their common ancestor directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use syncwatch_core::config::Config;
use syncwatch_core::domain::WatchedResource;
use syncwatch_monitor::MonitorEngine;
use tokio::runtime::Handle;
use tracing::info;

use super::cloud::progress_json;
use super::{absolute_path, common_ancestor, wait_for_shutdown};
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Download progress subscription
#[derive(Debug, Args)]
pub struct ProgressCommand {
    /// Files to follow
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Minimum interval between reports per file (defaults to the configured value)
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

impl ProgressCommand {
    pub async fn execute(&self, format: OutputFormat, config: Config) -> Result<()> {
        let formatter: Arc<dyn OutputFormatter> =
            Arc::from(get_formatter(matches!(format, OutputFormat::Json)));

        let files = self
            .files
            .iter()
            .map(|f| absolute_path(f))
            .collect::<Result<Vec<_>>>()?;
        let scope = common_ancestor(&files).context("No files given")?;
        let interval = self
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.monitor.progress_interval());

        let engine =
            MonitorEngine::with_xattr_search(WatchedResource::new(&scope)?, config, Handle::current());

        let mut subscriptions = Vec::with_capacity(files.len());
        for file in &files {
            let sink = Arc::clone(&formatter);
            let path = file.clone();
            let subscription = engine.subscribe_to_progress(file, interval, move |progress| {
                sink.event(
                    &format!("{} {:>5.1}%", path.display(), progress * 100.0),
                    progress_json(&path, progress),
                );
            })?;
            subscriptions.push(subscription);
        }

        info!(
            scope = %scope.display(),
            files = files.len(),
            interval_ms = interval.as_millis() as u64,
            "Following download progress"
        );
        formatter.info(&format!(
            "Following {} file(s) below {} (Ctrl+C to stop)",
            files.len(),
            scope.display()
        ));

        wait_for_shutdown().await;
        for (resource, id) in &subscriptions {
            engine.unsubscribe_from_progress(resource, *id);
        }
        Ok(())
    }
}
