//! Cloud-backed directory monitor
//!
//! A [`CloudChangeMonitor`] watches one directory subtree through an
//! [`ICloudItemSearch`]. The first full result set is reported as an initial
//! fetch; later search updates become incremental [`ChangeBatch`]es.
//!
//! Removal notifications from the search are not trusted on their own: a
//! removed item is only reported once [`IFileProbe::exists`] confirms it is
//! gone from disk. Download progress of changed items is throttled per file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use syncwatch_core::config::MonitorConfig;
use syncwatch_core::domain::resource::normalize_path;
use syncwatch_core::domain::{
    ChangeBatch, CloudItem, DownloadState, NoiseFilter, SearchPredicate, WatchedResource,
};
use syncwatch_core::ports::{ICloudItemSearch, IFileProbe, ISearchSession, SearchEvent, WatchHandle};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gate::CallbackGate;
use crate::throttle::ProgressThrottle;
use crate::{
    log_item_failure, ChangeCallback, DeletedCallback, FileProgressCallback, MonitorError,
};

// ============================================================================
// Options and callbacks
// ============================================================================

/// Tunables for a [`CloudChangeMonitor`]
#[derive(Debug, Clone)]
pub struct CloudMonitorOptions {
    /// Log per-item failures at `warn` instead of `debug`
    pub verbose: bool,
    /// Diagnostic tag attached to every log line of this monitor
    pub caller: String,
    /// Minimum time between two progress samples for the same file
    pub progress_interval: Duration,
    /// Progress jump that bypasses `progress_interval`
    pub significant_delta: f64,
    /// File names that are never reported
    pub noise: NoiseFilter,
}

impl CloudMonitorOptions {
    /// Options derived from the `monitor` configuration section
    pub fn from_config(config: &MonitorConfig, caller: impl Into<String>) -> Self {
        Self {
            verbose: config.verbose,
            caller: caller.into(),
            progress_interval: config.progress_interval(),
            significant_delta: config.significant_delta,
            noise: config.noise_files.clone(),
        }
    }
}

impl Default for CloudMonitorOptions {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default(), "cloud")
    }
}

/// Callbacks receiving a cloud monitor's output
#[derive(Clone)]
pub struct CloudCallbacks {
    /// Throttled per-file download progress
    pub on_progress: FileProgressCallback,
    /// Removals confirmed on disk, one call per update batch
    pub on_deleted: DeletedCallback,
    /// Change batches, or the setup error
    pub on_change: ChangeCallback,
}

// ============================================================================
// CloudChangeMonitor
// ============================================================================

enum Lifecycle {
    Idle,
    Running {
        session: Option<Arc<dyn ISearchSession>>,
        token: CancellationToken,
    },
    Stopped,
}

struct Inner {
    directory: WatchedResource,
    options: CloudMonitorOptions,
    callbacks: CloudCallbacks,
    search: Arc<dyn ICloudItemSearch>,
    probe: Arc<dyn IFileProbe>,
    runtime: Handle,
    lifecycle: Mutex<Lifecycle>,
    gate: CallbackGate,
}

/// State owned by the worker task
struct WorkerState {
    known: HashSet<PathBuf>,
    throttle: ProgressThrottle<PathBuf>,
}

/// Monitors a cloud-backed directory subtree
pub struct CloudChangeMonitor {
    inner: Arc<Inner>,
}

impl CloudChangeMonitor {
    pub fn new(
        directory: WatchedResource,
        options: CloudMonitorOptions,
        callbacks: CloudCallbacks,
        search: Arc<dyn ICloudItemSearch>,
        probe: Arc<dyn IFileProbe>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                directory,
                options,
                callbacks,
                search,
                probe,
                runtime,
                lifecycle: Mutex::new(Lifecycle::Idle),
                gate: CallbackGate::new(),
            }),
        }
    }

    /// Starts the search and returns the handle that stops it
    ///
    /// A monitor starts at most once; later calls return an inert handle. If
    /// the search cannot be started the error is delivered once through
    /// `on_change` and the monitor stays inert.
    pub fn start(&self) -> WatchHandle {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            warn!(caller = %inner.options.caller, path = %inner.directory, "Cloud monitor already started");
            return WatchHandle::inert();
        }

        let predicate =
            SearchPredicate::descendants_of(inner.directory.clone(), inner.options.noise.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        match inner.search.start(predicate.clone(), events_tx) {
            Ok(session) => {
                let session: Arc<dyn ISearchSession> = session.into();
                inner.runtime.spawn(run_worker(
                    Arc::clone(inner),
                    Arc::clone(&session),
                    events_rx,
                    predicate,
                    token.clone(),
                ));
                *lifecycle = Lifecycle::Running {
                    session: Some(session),
                    token,
                };
                info!(caller = %inner.options.caller, path = %inner.directory, "Cloud directory watch started");
            }
            Err(err) => {
                warn!(
                    caller = %inner.options.caller,
                    path = %inner.directory,
                    error = %err,
                    "Failed to start cloud directory watch"
                );
                let error = MonitorError::SearchStart {
                    path: inner.directory.as_path().to_path_buf(),
                    reason: format!("{err:#}"),
                };
                let reporter = Arc::clone(inner);
                inner.runtime.spawn(async move {
                    reporter.gate.deliver(|| (reporter.callbacks.on_change)(Err(error)));
                });
                *lifecycle = Lifecycle::Running {
                    session: None,
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
    fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        self.gate.close();

        if let Lifecycle::Running { session, token } = previous {
            token.cancel();
            if let Some(session) = session {
                session.stop();
            }
            info!(caller = %self.options.caller, path = %self.directory, "Cloud directory watch stopped");
        }
    }

    /// Normalized path of an item the predicate accepts
    fn accept(&self, item: &CloudItem, predicate: &SearchPredicate) -> Option<PathBuf> {
        match normalize_path(&item.path) {
            Ok(path) if predicate.matches_path(&path) => Some(path),
            Ok(_) => None,
            Err(err) => {
                log_item_failure(self.options.verbose, &item.path, &err.to_string());
                None
            }
        }
    }

    fn handle_gathered(
        &self,
        items: Vec<CloudItem>,
        predicate: &SearchPredicate,
        state: &mut WorkerState,
    ) {
        let mut batch = ChangeBatch {
            is_initial_fetch: true,
            ..ChangeBatch::default()
        };
        let mut samples = Vec::new();

        for item in items {
            let Some(path) = self.accept(&item, predicate) else {
                continue;
            };
            if let DownloadState::Downloading(progress) = item.download_state() {
                if state
                    .throttle
                    .should_emit(path.clone(), progress, self.options.progress_interval)
                {
                    samples.push((path.clone(), progress));
                }
            }
            if state.known.insert(path.clone()) {
                batch.added.push(path);
            }
        }

        debug!(
            caller = %self.options.caller,
            path = %self.directory,
            count = batch.added.len(),
            "Initial cloud listing gathered"
        );

        self.gate
            .deliver(|| (self.callbacks.on_change)(Ok(batch)));
        self.deliver_progress(samples);
    }

    async fn handle_update(
        &self,
        changed: Vec<CloudItem>,
        removed: Vec<CloudItem>,
        predicate: &SearchPredicate,
        state: &mut WorkerState,
        token: &CancellationToken,
    ) {
        let mut batch = ChangeBatch::default();

        for item in removed {
            let Some(path) = self.accept(&item, predicate) else {
                continue;
            };
            if self.probe.exists(&path).await {
                debug!(
                    caller = %self.options.caller,
                    path = %path.display(),
                    "Ignoring removal of a file still on disk"
                );
                continue;
            }
            state.known.remove(&path);
            state.throttle.reset(&path);
            batch.removed.push(path);
        }

        if token.is_cancelled() {
            return;
        }

        let mut samples = Vec::new();
        for item in changed {
            let Some(path) = self.accept(&item, predicate) else {
                continue;
            };
            if let Some(progress) = self.progress_sample(&item, &path, state) {
                samples.push((path.clone(), progress));
            }
            if state.known.insert(path.clone()) {
                batch.added.push(path);
            } else {
                batch.changed.push(path);
            }
        }

        if !batch.removed.is_empty() {
            let removed = batch.removed.clone();
            self.gate.deliver(|| (self.callbacks.on_deleted)(removed));
        }
        if batch.has_changes() {
            self.gate.deliver(|| (self.callbacks.on_change)(Ok(batch)));
        }
        self.deliver_progress(samples);
    }

    /// Throttled progress sample for a changed item, if one is due
    fn progress_sample(
        &self,
        item: &CloudItem,
        path: &Path,
        state: &mut WorkerState,
    ) -> Option<f64> {
        match item.download_state() {
            DownloadState::Downloading(progress) => state
                .throttle
                .should_emit(path.to_path_buf(), progress, self.options.progress_interval)
                .then_some(progress),
            DownloadState::Complete => {
                state.throttle.reset(path);
                Some(1.0)
            }
            DownloadState::Idle => {
                state.throttle.reset(path);
                None
            }
            DownloadState::Unknown => {
                log_item_failure(self.options.verbose, path, "missing download attributes");
                None
            }
        }
    }

    fn deliver_progress(&self, samples: Vec<(PathBuf, f64)>) {
        if samples.is_empty() {
            return;
        }
        self.gate.deliver(|| {
            for (path, progress) in &samples {
                (self.callbacks.on_progress)(path, *progress);
            }
        });
    }
}

/// Sequential event loop for one cloud directory watch
async fn run_worker(
    inner: Arc<Inner>,
    session: Arc<dyn ISearchSession>,
    mut events: mpsc::UnboundedReceiver<SearchEvent>,
    predicate: SearchPredicate,
    token: CancellationToken,
) {
    let mut state = WorkerState {
        known: HashSet::new(),
        throttle: ProgressThrottle::with_significant_delta(inner.options.significant_delta),
    };

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        session.disable_updates();
        match event {
            SearchEvent::GatheringStarted => {
                debug!(caller = %inner.options.caller, path = %inner.directory, "Cloud listing gathering");
            }
            SearchEvent::GatheringFinished(items) => {
                inner.handle_gathered(items, &predicate, &mut state);
            }
            SearchEvent::Updated { changed, removed } => {
                inner
                    .handle_update(changed, removed, &predicate, &mut state, &token)
                    .await;
            }
        }

        if token.is_cancelled() {
            break;
        }
        session.enable_updates();
    }

    debug!(caller = %inner.options.caller, path = %inner.directory, "Cloud worker exited");
}
