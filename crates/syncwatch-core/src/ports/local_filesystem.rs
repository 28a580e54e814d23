//! Local filesystem port (driven/secondary port)
//!
//! This module defines the checks the monitors perform against the real
//! filesystem: existence (to confirm removals), materialization (to turn a
//! finished download into a completion signal) and directory listing.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` for checks whose failures are adapter-specific and
//!   `std::io::Result` for listings, so callers can tell "not found" apart.
//! - `WatchHandle` is the cancellation guard returned by every monitor's
//!   `start()`. Cancelling is idempotent and dropping the handle cancels.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

// ============================================================================
// IFileProbe trait
// ============================================================================

/// Port trait for verifying local filesystem state
///
/// ## Implementation Notes
///
/// - `exists` must not follow the search facility's view of the world; it is
///   the independent check used to reject spurious removal notifications.
/// - `is_materialized` returns `Ok(false)` for missing paths.
#[async_trait::async_trait]
pub trait IFileProbe: Send + Sync {
    /// Returns true if something exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// Returns true if the file's bytes are fully present on local storage
    ///
    /// # Errors
    /// Returns an error if the file's state cannot be determined
    async fn is_materialized(&self, path: &Path) -> anyhow::Result<bool>;

    /// Lists the immediate children of a directory
    ///
    /// # Errors
    /// Returns the underlying I/O error; `ErrorKind::NotFound` when the
    /// directory does not exist
    async fn list_children(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>>;
}

// ============================================================================
// WatchHandle struct
// ============================================================================

/// Cancellation handle for an active watch
///
/// Cancelling stops the underlying watch and guarantees that the monitor's
/// callbacks do not run once [`cancel`](WatchHandle::cancel) has returned.
/// The stop callback runs at most once no matter how many times `cancel` is
/// called, and dropping the handle cancels it.
///
/// ## Usage
///
/// ```ignore
/// let handle = monitor.start();
/// // ... watch is active ...
/// handle.cancel();
/// handle.cancel(); // no-op
/// ```
pub struct WatchHandle {
    /// Callback stopping the watch; taken on first cancel
    stop_fn: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl WatchHandle {
    /// Creates a new WatchHandle with the given stop callback
    pub fn new(stop_fn: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop_fn: Mutex::new(Some(Box::new(stop_fn))),
        }
    }

    /// A handle for a watch that never started
    pub fn inert() -> Self {
        Self {
            stop_fn: Mutex::new(None),
        }
    }

    /// Stops the watch; later calls do nothing
    pub fn cancel(&self) {
        let stop_fn = self.stop_fn.lock().take();
        if let Some(stop_fn) = stop_fn {
            stop_fn();
        }
    }

    /// Returns true until the handle has been cancelled
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.stop_fn.lock().is_some()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(stop_fn) = self.stop_fn.get_mut().take() {
            stop_fn();
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}
