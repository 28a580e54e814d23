//! Cloud command - Report changes below a cloud-backed directory
//!
//! Provides the `syncwatch cloud <dir>` CLI command which prints the initial
//! contents of the subtree, then every batch of additions and changes,
//! every confirmed removal and throttled download progress until
//! interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use syncwatch_core::config::Config;
use syncwatch_core::domain::{ChangeBatch, WatchedResource};
use syncwatch_monitor::{MonitorEngine, MonitorError};
use tokio::runtime::Handle;
use tracing::info;

use super::{absolute_path, wait_for_shutdown};
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Cloud directory watch
#[derive(Debug, Args)]
pub struct CloudCommand {
    /// Root of the cloud-backed subtree to watch
    pub dir: PathBuf,

    /// Override the minimum interval between progress reports per file
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

impl CloudCommand {
    pub async fn execute(&self, format: OutputFormat, mut config: Config) -> Result<()> {
        let formatter: Arc<dyn OutputFormatter> =
            Arc::from(get_formatter(matches!(format, OutputFormat::Json)));
        let dir = absolute_path(&self.dir)?;
        if let Some(ms) = self.interval_ms {
            config.monitor.progress_interval_ms = ms;
        }

        let engine = MonitorEngine::with_xattr_search(
            WatchedResource::new(&dir)?,
            config,
            Handle::current(),
        );

        let on_change = {
            let sink = Arc::clone(&formatter);
            move |result: Result<ChangeBatch, MonitorError>| match result {
                Ok(batch) => sink.event(&batch_summary(&batch), batch_json(&batch)),
                Err(e) => sink.error(&e.to_string()),
            }
        };
        let on_deleted = {
            let sink = Arc::clone(&formatter);
            move |paths: Vec<PathBuf>| {
                for path in &paths {
                    sink.event(&format!("- {}", path.display()), deleted_json(path));
                }
            }
        };
        let on_progress = {
            let sink = Arc::clone(&formatter);
            move |path: &Path, progress: f64| {
                sink.event(
                    &format!("{} {:>5.1}%", path.display(), progress * 100.0),
                    progress_json(path, progress),
                );
            }
        };

        let handle = engine.watch_cloud_directory(&dir, on_change, on_deleted, on_progress)?;

        info!(dir = %dir.display(), "Watching cloud directory");
        formatter.info(&format!("Watching {} (Ctrl+C to stop)", dir.display()));

        wait_for_shutdown().await;
        handle.cancel();
        Ok(())
    }
}

fn batch_summary(batch: &ChangeBatch) -> String {
    let mut summary = if batch.is_initial_fetch {
        format!("Initial contents: {} item(s)", batch.added.len())
    } else {
        format!(
            "{} added, {} changed",
            batch.added.len(),
            batch.changed.len()
        )
    };
    for path in &batch.added {
        summary.push_str(&format!("\n    + {}", path.display()));
    }
    for path in &batch.changed {
        summary.push_str(&format!("\n    ~ {}", path.display()));
    }
    summary
}

fn paths_json(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

fn batch_json(batch: &ChangeBatch) -> serde_json::Value {
    serde_json::json!({
        "event": "changes",
        "initial": batch.is_initial_fetch,
        "added": paths_json(&batch.added),
        "changed": paths_json(&batch.changed),
        "removed": paths_json(&batch.removed),
    })
}

fn deleted_json(path: &Path) -> serde_json::Value {
    serde_json::json!({
        "event": "deleted",
        "path": path.display().to_string(),
    })
}

pub(crate) fn progress_json(path: &Path, progress: f64) -> serde_json::Value {
    serde_json::json!({
        "event": "progress",
        "path": path.display().to_string(),
        "progress": progress,
    })
}
