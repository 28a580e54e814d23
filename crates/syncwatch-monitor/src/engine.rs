//! Composition root for the monitors
//!
//! [`MonitorEngine`] wires configuration, the search facility and the file
//! probe into the consumer-facing operations: progress subscriptions plus
//! cloud and local directory watches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use syncwatch_core::config::Config;
use syncwatch_core::domain::{ChangeBatch, DirectorySnapshot, SubscriptionId, WatchedResource};
use syncwatch_core::ports::{ICloudItemSearch, IFileProbe, WatchHandle};
use tokio::runtime::Handle;

use crate::cloud::{CloudCallbacks, CloudChangeMonitor, CloudMonitorOptions};
use crate::global::GlobalProgressMonitor;
use crate::local::LocalChangeMonitor;
use crate::probe::LocalFileProbe;
use crate::search::PollingXattrSearch;
use crate::MonitorError;

/// Owns the shared progress monitor and creates directory watches
pub struct MonitorEngine {
    config: Config,
    search: Arc<dyn ICloudItemSearch>,
    probe: Arc<dyn IFileProbe>,
    runtime: Handle,
    progress: GlobalProgressMonitor,
}

impl MonitorEngine {
    /// Creates an engine whose progress monitor searches below `scope`
    pub fn new(
        scope: WatchedResource,
        config: Config,
        search: Arc<dyn ICloudItemSearch>,
        probe: Arc<dyn IFileProbe>,
        runtime: Handle,
    ) -> Self {
        let progress = GlobalProgressMonitor::new(
            scope,
            &config.monitor,
            Arc::clone(&search),
            Arc::clone(&probe),
            runtime.clone(),
        );

        Self {
            config,
            search,
            probe,
            runtime,
            progress,
        }
    }

    /// Creates an engine backed by the extended-attribute polling search
    pub fn with_xattr_search(scope: WatchedResource, config: Config, runtime: Handle) -> Self {
        let search = Arc::new(PollingXattrSearch::new(
            config.search.clone(),
            runtime.clone(),
        ));
        let probe = Arc::new(LocalFileProbe::new(&config.search));
        Self::new(scope, config, search, probe, runtime)
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared progress monitor
    pub fn progress(&self) -> &GlobalProgressMonitor {
        &self.progress
    }

    /// Subscribes to the download progress of the file at `path`
    ///
    /// # Errors
    /// Fails if `path` is not absolute or the shared search cannot start.
    pub fn subscribe_to_progress(
        &self,
        path: impl Into<PathBuf>,
        min_interval: Duration,
        on_progress: impl Fn(f64) + Send + Sync + 'static,
    ) -> Result<(WatchedResource, SubscriptionId), MonitorError> {
        let resource = WatchedResource::new(path)?;
        let id = self
            .progress
            .subscribe(resource.clone(), min_interval, on_progress)?;
        Ok((resource, id))
    }

    /// Ends a progress subscription; repeated calls are no-ops
    pub fn unsubscribe_from_progress(&self, resource: &WatchedResource, id: SubscriptionId) -> bool {
        self.progress.unsubscribe(resource, id)
    }

    /// Watches a cloud-backed directory subtree
    ///
    /// # Errors
    /// Fails only if `path` is not absolute; search start failures are
    /// delivered through `on_change`.
    pub fn watch_cloud_directory(
        &self,
        path: impl AsRef<Path>,
        on_change: impl Fn(Result<ChangeBatch, MonitorError>) + Send + Sync + 'static,
        on_deleted: impl Fn(Vec<PathBuf>) + Send + Sync + 'static,
        on_progress: impl Fn(&Path, f64) + Send + Sync + 'static,
    ) -> Result<WatchHandle, MonitorError> {
        let directory = WatchedResource::new(path.as_ref())?;
        let options = CloudMonitorOptions::from_config(
            &self.config.monitor,
            format!("cloud:{}", directory.file_name().unwrap_or_default().to_string_lossy()),
        );
        let callbacks = CloudCallbacks {
            on_progress: Arc::new(on_progress),
            on_deleted: Arc::new(on_deleted),
            on_change: Arc::new(on_change),
        };

        let monitor = CloudChangeMonitor::new(
            directory,
            options,
            callbacks,
            Arc::clone(&self.search),
            Arc::clone(&self.probe),
            self.runtime.clone(),
        );
        Ok(monitor.start())
    }

    /// Watches the immediate children of a local directory
    ///
    /// # Errors
    /// Fails only if `path` is not absolute; watch setup failures are
    /// delivered through `on_change`.
    pub fn watch_local_directory(
        &self,
        path: impl AsRef<Path>,
        on_change: impl Fn(Result<DirectorySnapshot, MonitorError>) + Send + Sync + 'static,
    ) -> Result<WatchHandle, MonitorError> {
        let directory = WatchedResource::new(path.as_ref())?;
        let monitor = LocalChangeMonitor::new(
            directory,
            self.config.monitor.noise_files.clone(),
            Arc::new(on_change),
            Arc::clone(&self.probe),
            self.runtime.clone(),
        );
        Ok(monitor.start())
    }
}
