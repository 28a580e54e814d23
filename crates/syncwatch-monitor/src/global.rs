//! Process-wide download progress monitor
//!
//! [`GlobalProgressMonitor`] multiplexes any number of progress subscriptions
//! over a single cloud item search restricted to items being downloaded.
//!
//! ## Architecture
//!
//! ```text
//! subscribe() ──┐                         ┌──► callback (sub 1)
//!               ▼                         │
//!      ┌─────────────────┐   SearchEvent  │
//!      │  MonitorState   │◄──────────┐    ├──► callback (sub 2)
//!      │  registry       │           │    │
//!      │  throttle       │      ┌─────────┴──┐
//!      │  live search    │─────►│  worker    │
//!      └─────────────────┘      └────────────┘
//! ```
//!
//! - The search starts when the registry goes from empty to non-empty and
//!   stops when the last subscriber leaves.
//! - One worker task processes search events sequentially. Updates are
//!   disabled on the session while a batch is processed.
//! - Callbacks run outside the state lock, behind the callback gate, so a
//!   callback may subscribe or unsubscribe without deadlocking and an
//!   unsubscribed callback never fires after `unsubscribe` returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use syncwatch_core::config::MonitorConfig;
use syncwatch_core::domain::resource::normalize_path;
use syncwatch_core::domain::{
    CloudItem, DownloadState, MatchPolicy, SearchPredicate, SubscriptionId, WatchedResource,
};
use syncwatch_core::ports::{ICloudItemSearch, IFileProbe, ISearchSession, SearchEvent};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gate::CallbackGate;
use crate::registry::{SubscriberRegistry, Subscription};
use crate::throttle::{ProgressThrottle, ThrottleState};
use crate::{log_item_failure, MonitorError};

type ThrottleKey = (WatchedResource, SubscriptionId);

/// Search session plus the token stopping its worker
struct ActiveWatch {
    session: Arc<dyn ISearchSession>,
    token: CancellationToken,
}

impl ActiveWatch {
    fn stop(self) {
        self.token.cancel();
        self.session.stop();
    }
}

struct MonitorState {
    registry: SubscriberRegistry,
    throttle: ProgressThrottle<ThrottleKey>,
    watch: Option<ActiveWatch>,
}

struct Inner {
    scope: WatchedResource,
    config: MonitorConfig,
    search: Arc<dyn ICloudItemSearch>,
    probe: Arc<dyn IFileProbe>,
    runtime: Handle,
    state: Mutex<MonitorState>,
    /// Last progress seen per in-flight item, for snapshots on subscribe
    last_known: DashMap<PathBuf, f64>,
    gate: CallbackGate,
}

/// Shares one live download search among many progress subscribers
pub struct GlobalProgressMonitor {
    inner: Arc<Inner>,
}

impl GlobalProgressMonitor {
    /// Creates a monitor for downloads below `scope`
    ///
    /// Nothing is watched until the first subscription arrives.
    pub fn new(
        scope: WatchedResource,
        config: &MonitorConfig,
        search: Arc<dyn ICloudItemSearch>,
        probe: Arc<dyn IFileProbe>,
        runtime: Handle,
    ) -> Self {
        let state = MonitorState {
            registry: SubscriberRegistry::new(),
            throttle: ProgressThrottle::with_significant_delta(config.significant_delta),
            watch: None,
        };

        Self {
            inner: Arc::new(Inner {
                scope,
                config: config.clone(),
                search,
                probe,
                runtime,
                state: Mutex::new(state),
                last_known: DashMap::new(),
                gate: CallbackGate::new(),
            }),
        }
    }

    /// Registers interest in the download progress of `resource`
    ///
    /// Starts the shared search if this is the first subscription. If progress
    /// for the resource is already known it is delivered to `on_progress`
    /// before this returns.
    ///
    /// # Errors
    /// Returns [`MonitorError::SearchStart`] if the search had to be started
    /// and could not be; the subscription is not registered in that case.
    pub fn subscribe(
        &self,
        resource: WatchedResource,
        min_interval: Duration,
        on_progress: impl Fn(f64) + Send + Sync + 'static,
    ) -> Result<SubscriptionId, MonitorError> {
        let subscription = Subscription::new(resource.clone(), min_interval, Arc::new(on_progress));
        let id = subscription.id;

        let snapshot = {
            let mut state = self.inner.state.lock();
            let first = state.registry.insert(subscription.clone());

            if first && state.watch.is_none() {
                match start_watch(&self.inner) {
                    Ok(watch) => state.watch = Some(watch),
                    Err(err) => {
                        state.registry.remove(&resource, id);
                        return Err(err);
                    }
                }
            }

            self.inner.known_progress(&resource).map(|progress| {
                let now = Instant::now();
                state
                    .throttle
                    .record_at((resource.clone(), id), progress, now);
                ThrottleState {
                    last_emitted_at: now,
                    last_emitted_progress: progress,
                }
            })
        };

        debug!(resource = %resource, subscription = %id, "Progress subscriber added");

        if let Some(seeded) = snapshot {
            let key = (resource, id);
            self.inner.gate.deliver(|| {
                // A worker dispatch between seeding and here already delivered
                // a newer sample (or completion); the snapshot is stale then
                let current = self.inner.state.lock().throttle.state(&key).copied();
                if current == Some(seeded) {
                    subscription.notify(seeded.last_emitted_progress);
                }
            });
        }

        Ok(id)
    }

    /// Removes a subscription
    ///
    /// Stops the shared search when no subscriber remains. Returns false if
    /// the subscription was not registered (for example on a second call).
    /// Once this returns the subscription's callback will not be invoked again.
    pub fn unsubscribe(&self, resource: &WatchedResource, id: SubscriptionId) -> bool {
        let stopped = {
            let mut state = self.inner.state.lock();
            let Some(removal) = state.registry.remove(resource, id) else {
                return false;
            };
            state.throttle.reset(&(resource.clone(), id));

            if removal.registry_emptied {
                state.throttle.clear();
                self.inner.last_known.clear();
                state.watch.take()
            } else {
                None
            }
        };

        debug!(resource = %resource, subscription = %id, "Progress subscriber removed");

        if let Some(watch) = stopped {
            watch.stop();
            info!(scope = %self.inner.scope, "Last progress subscriber left, search stopped");
        }

        self.inner.gate.barrier();
        true
    }

    /// Returns true while the shared search is running
    pub fn is_watching(&self) -> bool {
        self.inner.state.lock().watch.is_some()
    }

    /// Total number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().registry.subscriber_count()
    }

    /// Root of the searched subtree
    pub fn scope(&self) -> &WatchedResource {
        &self.inner.scope
    }
}

impl Drop for GlobalProgressMonitor {
    fn drop(&mut self) {
        self.inner.gate.close();
        let watch = {
            let mut state = self.inner.state.lock();
            state.registry.drain();
            state.watch.take()
        };
        if let Some(watch) = watch {
            watch.stop();
        }
    }
}

/// Starts the shared search and its worker; called with the state lock held
fn start_watch(inner: &Arc<Inner>) -> Result<ActiveWatch, MonitorError> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let predicate =
        SearchPredicate::downloading_within(inner.scope.clone(), inner.config.noise_files.clone());

    let session: Arc<dyn ISearchSession> = inner
        .search
        .start(predicate, events_tx)
        .map_err(|err| {
            warn!(scope = %inner.scope, error = %err, "Failed to start progress search");
            MonitorError::SearchStart {
                path: inner.scope.as_path().to_path_buf(),
                reason: format!("{err:#}"),
            }
        })?
        .into();

    let token = CancellationToken::new();
    inner.runtime.spawn(run_worker(
        Arc::clone(inner),
        Arc::clone(&session),
        events_rx,
        token.clone(),
    ));

    info!(scope = %inner.scope, "Progress search started");
    Ok(ActiveWatch { session, token })
}

/// Sequential event loop for one search session
async fn run_worker(
    inner: Arc<Inner>,
    session: Arc<dyn ISearchSession>,
    mut events: mpsc::UnboundedReceiver<SearchEvent>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        session.disable_updates();
        inner.handle_event(event, &token).await;
        if token.is_cancelled() {
            break;
        }
        session.enable_updates();
    }

    debug!(scope = %inner.scope, "Progress worker exited");
}

impl Inner {
    async fn handle_event(&self, event: SearchEvent, token: &CancellationToken) {
        match event {
            SearchEvent::GatheringStarted => {
                debug!(scope = %self.scope, "Progress search gathering");
            }
            SearchEvent::GatheringFinished(items) => {
                debug!(scope = %self.scope, count = items.len(), "Progress search gathered");
                for item in items {
                    if token.is_cancelled() {
                        return;
                    }
                    self.handle_present(item);
                }
            }
            SearchEvent::Updated { changed, removed } => {
                for item in removed {
                    if token.is_cancelled() {
                        return;
                    }
                    self.handle_removed(item).await;
                }
                for item in changed {
                    if token.is_cancelled() {
                        return;
                    }
                    self.handle_present(item);
                }
            }
        }
    }

    /// An item that left the result set: finished, cancelled or evicted
    async fn handle_removed(&self, item: CloudItem) {
        let Some(path) = self.item_path(&item) else {
            return;
        };
        self.last_known.remove(&path);

        match self.probe.is_materialized(&path).await {
            Ok(true) => self.dispatch(&path, 1.0),
            Ok(false) => {
                debug!(path = %path.display(), "Item left downloads without materializing");
                self.reset_matching(&path);
            }
            Err(err) => {
                log_item_failure(self.config.verbose, &path, &format!("{err:#}"));
                self.reset_matching(&path);
            }
        }
    }

    /// An item still in the result set
    fn handle_present(&self, item: CloudItem) {
        let Some(path) = self.item_path(&item) else {
            return;
        };

        match item.download_state() {
            DownloadState::Downloading(progress) => {
                self.last_known.insert(path.clone(), progress);
                self.dispatch(&path, progress);
            }
            DownloadState::Complete => {
                self.last_known.remove(&path);
                self.dispatch(&path, 1.0);
            }
            DownloadState::Idle => {
                self.last_known.remove(&path);
                self.reset_matching(&path);
            }
            DownloadState::Unknown => {
                log_item_failure(self.config.verbose, &path, "missing download attributes");
            }
        }
    }

    fn item_path(&self, item: &CloudItem) -> Option<PathBuf> {
        match normalize_path(&item.path) {
            Ok(path) => Some(path),
            Err(err) => {
                log_item_failure(self.config.verbose, &item.path, &err.to_string());
                None
            }
        }
    }

    /// Throttles `progress` per matching subscriber and invokes survivors
    fn dispatch(&self, path: &Path, progress: f64) {
        let now = Instant::now();
        let deliveries: Vec<Subscription> = {
            let mut guard = self.state.lock();
            let MonitorState {
                registry, throttle, ..
            } = &mut *guard;

            let mut deliveries = Vec::new();
            for subscription in registry.matching(path, self.config.match_policy) {
                let key = (subscription.resource.clone(), subscription.id);
                if throttle.should_emit_at(key.clone(), progress, subscription.min_interval, now) {
                    if progress >= 1.0 {
                        throttle.reset(&key);
                    }
                    deliveries.push(subscription.clone());
                }
            }
            deliveries
        };

        if deliveries.is_empty() {
            return;
        }

        self.gate.deliver(|| {
            for subscription in &deliveries {
                subscription.notify(progress);
            }
        });
    }

    fn reset_matching(&self, path: &Path) {
        let mut guard = self.state.lock();
        let MonitorState {
            registry, throttle, ..
        } = &mut *guard;

        for subscription in registry.matching(path, self.config.match_policy) {
            throttle.reset(&(subscription.resource.clone(), subscription.id));
        }
    }

    fn known_progress(&self, resource: &WatchedResource) -> Option<f64> {
        match self.config.match_policy {
            MatchPolicy::FullPath => self
                .last_known
                .get(resource.as_path())
                .map(|entry| *entry.value()),
            MatchPolicy::FileName => self
                .last_known
                .iter()
                .find(|entry| resource.matches(entry.key(), self.config.match_policy))
                .map(|entry| *entry.value()),
        }
    }
}
