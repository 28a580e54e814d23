//! Local directory monitor
//!
//! Wraps a non-recursive `notify` watch on one directory. Every relevant
//! filesystem event triggers a rescan that lists the directory's immediate
//! children and hands the full [`DirectorySnapshot`] to the change callback.
//!
//! ## Architecture
//!
//! ```text
//! notify watcher ──→ mpsc (unit triggers) ──→ worker ──→ rescan ──→ on_change
//! ```
//!
//! Triggers that pile up while a scan runs are drained before the next scan,
//! so a burst of events costs one follow-up scan.

use std::io;
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use syncwatch_core::domain::{DirectorySnapshot, NoiseFilter, WatchedResource};
use syncwatch_core::ports::{IFileProbe, WatchHandle};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gate::CallbackGate;
use crate::{ListingCallback, MonitorError};

enum Lifecycle {
    Idle,
    Running {
        /// Kept alive for the duration of the watch; `None` if setup failed
        watcher: Option<RecommendedWatcher>,
        token: CancellationToken,
    },
    Stopped,
}

struct ScanState {
    initial_pending: bool,
}

struct Inner {
    directory: WatchedResource,
    noise: NoiseFilter,
    on_change: ListingCallback,
    probe: Arc<dyn IFileProbe>,
    runtime: Handle,
    lifecycle: Mutex<Lifecycle>,
    scan_state: Mutex<ScanState>,
    gate: CallbackGate,
}

/// Monitors the immediate children of a local directory
pub struct LocalChangeMonitor {
    inner: Arc<Inner>,
}

impl LocalChangeMonitor {
    pub fn new(
        directory: WatchedResource,
        noise: NoiseFilter,
        on_change: ListingCallback,
        probe: Arc<dyn IFileProbe>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                directory,
                noise,
                on_change,
                probe,
                runtime,
                lifecycle: Mutex::new(Lifecycle::Idle),
                scan_state: Mutex::new(ScanState {
                    initial_pending: true,
                }),
                gate: CallbackGate::new(),
            }),
        }
    }

    /// Opens the watch, schedules the initial scan and returns the handle
    ///
    /// If the watch cannot be established the error is delivered once through
    /// `on_change` and the monitor stays inert. Starting twice yields an
    /// inert handle.
    pub fn start(&self) -> WatchHandle {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            warn!(path = %inner.directory, "Local monitor already started");
            return WatchHandle::inert();
        }

        let token = CancellationToken::new();
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        match inner.open_watcher(trigger_tx) {
            Ok(watcher) => {
                inner
                    .runtime
                    .spawn(run_worker(Arc::clone(inner), trigger_rx, token.clone()));
                *lifecycle = Lifecycle::Running {
                    watcher: Some(watcher),
                    token,
                };
                info!(path = %inner.directory, "Local directory watch started");
            }
            Err(error) => {
                warn!(path = %inner.directory, error = %error, "Failed to watch local directory");
                let reporter = Arc::clone(inner);
                inner.runtime.spawn(async move {
                    reporter.gate.deliver(|| (reporter.on_change)(Err(error)));
                });
                *lifecycle = Lifecycle::Running {
                    watcher: None,
                    token,
                };
            }
        }
        drop(lifecycle);

        let inner = Arc::clone(inner);
        WatchHandle::new(move || inner.cancel())
    }

    /// Stops the watch; safe to call repeatedly and from inside a callback
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// The watched directory
    pub fn directory(&self) -> &WatchedResource {
        &self.inner.directory
    }
}

impl Inner {
    fn open_watcher(
        &self,
        triggers: mpsc::UnboundedSender<()>,
    ) -> Result<RecommendedWatcher, MonitorError> {
        let path = self.directory.as_path();
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(MonitorError::WatchSetup {
                    path: path.to_path_buf(),
                    reason: "not a directory".into(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(MonitorError::NotFound(path.to_path_buf()))
            }
            Err(err) => {
                return Err(MonitorError::WatchSetup {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            }
        }

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if triggers_rescan(&event) {
                        // Receiver gone means the monitor was cancelled
                        let _ = triggers.send(());
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Local watcher error");
                }
            },
            notify::Config::default(),
        )
        .map_err(|err| self.setup_error(err))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|err| self.setup_error(err))?;

        Ok(watcher)
    }

    fn setup_error(&self, err: notify::Error) -> MonitorError {
        let path = self.directory.as_path().to_path_buf();
        match &err.kind {
            notify::ErrorKind::PathNotFound => MonitorError::NotFound(path),
            notify::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
                MonitorError::NotFound(path)
            }
            _ => MonitorError::WatchSetup {
                path,
                reason: err.to_string(),
            },
        }
    }

    fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        self.gate.close();

        if let Lifecycle::Running { watcher, token } = previous {
            token.cancel();
            drop(watcher);
            info!(path = %self.directory, "Local directory watch stopped");
        }
    }

    /// Lists the directory and reports the outcome
    async fn rescan(&self) {
        let result = self.scan().await;
        self.gate.deliver(|| (self.on_change)(result));
    }

    async fn scan(&self) -> Result<DirectorySnapshot, MonitorError> {
        let directory = self.directory.as_path();
        let mut children = match self.probe.list_children(directory).await {
            Ok(children) => children,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.directory, "Watched directory is gone");
                return Err(MonitorError::NotFound(directory.to_path_buf()));
            }
            Err(err) => return Err(MonitorError::Io(err)),
        };

        children.retain(|child| !self.noise.is_noise(child));
        children.sort();

        let is_initial_fetch = {
            let mut state = self.scan_state.lock();
            std::mem::replace(&mut state.initial_pending, false)
        };

        debug!(
            path = %self.directory,
            count = children.len(),
            initial = is_initial_fetch,
            "Local directory scanned"
        );

        Ok(DirectorySnapshot {
            directory: directory.to_path_buf(),
            children,
            is_initial_fetch,
        })
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    mut triggers: mpsc::UnboundedReceiver<()>,
    token: CancellationToken,
) {
    inner.rescan().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    break;
                }
            }
        }

        // Collapse the burst into a single scan
        while triggers.try_recv().is_ok() {}

        if token.is_cancelled() {
            break;
        }
        inner.rescan().await;
    }

    debug!(path = %inner.directory, "Local worker exited");
}

/// Returns true for events that can change the directory listing
///
/// Creations, removals, renames and content writes trigger a rescan; pure
/// access events do not.
fn triggers_rescan(event: &notify::Event) -> bool {
    match &event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Name(_))
        | EventKind::Modify(ModifyKind::Any) => true,
        EventKind::Modify(_) => false,
        EventKind::Any => true,
        EventKind::Access(_) | EventKind::Other => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    use super::*;

    fn event(kind: EventKind) -> notify::Event {
        notify::Event {
            kind,
            paths: vec![PathBuf::from("/d/a.txt")],
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_create_event_triggers() {
        assert!(triggers_rescan(&event(EventKind::Create(CreateKind::File))));
    }

    #[test]
    fn test_write_event_triggers() {
        assert!(triggers_rescan(&event(EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        )))));
    }

    #[test]
    fn test_rename_event_triggers() {
        assert!(triggers_rescan(&event(EventKind::Modify(ModifyKind::Name(
            RenameMode::Both
        )))));
        assert!(triggers_rescan(&event(EventKind::Modify(ModifyKind::Name(
            RenameMode::From
        )))));
    }

    #[test]
    fn test_remove_event_triggers() {
        assert!(triggers_rescan(&event(EventKind::Remove(RemoveKind::File))));
    }

    #[test]
    fn test_metadata_event_ignored() {
        assert!(!triggers_rescan(&event(EventKind::Modify(
            ModifyKind::Metadata(MetadataKind::Permissions)
        ))));
    }

    #[test]
    fn test_access_event_ignored() {
        assert!(!triggers_rescan(&event(EventKind::Access(AccessKind::Read))));
    }
}
