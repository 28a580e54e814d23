//! SyncWatch Monitor - Change and download-progress monitoring engine
//!
//! Provides:
//! - Throttled fan-out of download progress to many subscribers
//! - One shared cloud search per process, started on the first subscriber and
//!   stopped after the last one leaves
//! - Cloud directory monitoring with verified removals
//! - Local directory monitoring over OS filesystem events
//!
//! ## Modules
//!
//! - [`throttle`] - Per-key progress throttling policy
//! - [`registry`] - Subscriber bookkeeping with occupancy transitions
//! - [`global`] - Process-wide progress monitor sharing one live search
//! - [`cloud`] - Cloud-backed directory monitor
//! - [`local`] - Local directory monitor built on `notify`
//! - [`engine`] - Composition root exposing the consumer operations
//! - [`probe`] / [`search`] / [`xattr`] - Linux adapters reading hydration
//!   state from extended attributes

pub mod cloud;
pub mod engine;
mod gate;
pub mod global;
pub mod local;
pub mod probe;
pub mod registry;
pub mod search;
pub mod throttle;
pub mod xattr;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use syncwatch_core::domain::{ChangeBatch, DirectorySnapshot, DomainError};
use thiserror::Error;
use tracing::{debug, warn};

pub use cloud::{CloudCallbacks, CloudChangeMonitor, CloudMonitorOptions};
pub use engine::MonitorEngine;
pub use global::GlobalProgressMonitor;
pub use local::LocalChangeMonitor;
pub use probe::LocalFileProbe;
pub use registry::SubscriberRegistry;
pub use search::PollingXattrSearch;
pub use throttle::ProgressThrottle;

/// Callback receiving a subscriber's progress in `0.0..=1.0`
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Callback receiving per-file progress from a cloud directory monitor
pub type FileProgressCallback = Arc<dyn Fn(&Path, f64) + Send + Sync>;

/// Callback receiving confirmed removals from a cloud directory monitor
pub type DeletedCallback = Arc<dyn Fn(Vec<PathBuf>) + Send + Sync>;

/// Callback receiving cloud change batches or a setup error
pub type ChangeCallback = Arc<dyn Fn(Result<ChangeBatch, MonitorError>) + Send + Sync>;

/// Callback receiving local directory listings or a scan error
pub type ListingCallback = Arc<dyn Fn(Result<DirectorySnapshot, MonitorError>) + Send + Sync>;

/// Errors reported by the monitors
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The OS-level watch could not be established
    #[error("Failed to watch {path}: {reason}")]
    WatchSetup {
        /// Directory that could not be watched
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// The cloud item search could not be started
    #[error("Failed to start search in {path}: {reason}")]
    SearchStart {
        /// Scope of the search
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// The watched directory does not exist
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while scanning
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A domain-level error propagated from syncwatch-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Logs a per-item read failure; loud only in verbose mode
pub(crate) fn log_item_failure(verbose: bool, path: &Path, reason: &str) {
    if verbose {
        warn!(path = %path.display(), reason, "Skipping unreadable item");
    } else {
        debug!(path = %path.display(), reason, "Skipping unreadable item");
    }
}
