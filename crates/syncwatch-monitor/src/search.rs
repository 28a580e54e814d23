//! Polling cloud item search over extended attributes
//!
//! [`PollingXattrSearch`] implements [`ICloudItemSearch`] for Files-on-Demand
//! mounts that expose hydration state through extended attributes. A session
//! walks the scope once for the initial gathering, then rescans on a fixed
//! interval and reports the diff against the last published snapshot.
//!
//! While updates are disabled the session keeps polling time but does not
//! scan; the published snapshot stays put, so changes made in the meantime
//! are reported in full once updates are enabled again.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context};
use syncwatch_core::config::SearchConfig;
use syncwatch_core::domain::{CloudItem, SearchPredicate};
use syncwatch_core::ports::{ICloudItemSearch, ISearchSession, SearchEvent};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::xattr::read_cloud_item;

/// One scanned file: its attributes plus the mtime used to detect content changes
#[derive(Debug, Clone, PartialEq)]
struct Entry {
    item: CloudItem,
    modified: Option<SystemTime>,
}

type Snapshot = HashMap<PathBuf, Entry>;

// ============================================================================
// PollingXattrSearch
// ============================================================================

/// Search facility that polls a directory tree
#[derive(Debug, Clone)]
pub struct PollingXattrSearch {
    config: SearchConfig,
    runtime: Handle,
}

impl PollingXattrSearch {
    pub fn new(config: SearchConfig, runtime: Handle) -> Self {
        Self { config, runtime }
    }
}

impl ICloudItemSearch for PollingXattrSearch {
    fn start(
        &self,
        predicate: SearchPredicate,
        events: mpsc::UnboundedSender<SearchEvent>,
    ) -> anyhow::Result<Box<dyn ISearchSession>> {
        if self.config.poll_interval_ms == 0 {
            bail!("search.poll_interval_ms must be greater than 0");
        }
        let root = predicate.scope.as_path();
        let metadata = std::fs::metadata(root)
            .with_context(|| format!("Cannot search {}", root.display()))?;
        if !metadata.is_dir() {
            bail!("{} is not a directory", root.display());
        }

        let session = PollingSession {
            updates_enabled: Arc::new(AtomicBool::new(true)),
            token: CancellationToken::new(),
        };

        info!(
            scope = %predicate.scope,
            downloading_only = predicate.downloading_only,
            interval_ms = self.config.poll_interval_ms,
            "Starting polling search"
        );

        self.runtime.spawn(poll_loop(
            self.config.clone(),
            predicate,
            events,
            Arc::clone(&session.updates_enabled),
            session.token.clone(),
        ));

        Ok(Box::new(session))
    }
}

// ============================================================================
// PollingSession
// ============================================================================

struct PollingSession {
    updates_enabled: Arc<AtomicBool>,
    token: CancellationToken,
}

impl ISearchSession for PollingSession {
    fn enable_updates(&self) {
        self.updates_enabled.store(true, Ordering::Release);
    }

    fn disable_updates(&self) {
        self.updates_enabled.store(false, Ordering::Release);
    }

    fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for PollingSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn poll_loop(
    config: SearchConfig,
    predicate: SearchPredicate,
    events: mpsc::UnboundedSender<SearchEvent>,
    updates_enabled: Arc<AtomicBool>,
    token: CancellationToken,
) {
    if events.send(SearchEvent::GatheringStarted).is_err() {
        return;
    }

    let mut published = match scan(&config, &predicate).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(scope = %predicate.scope, error = %err, "Initial scan failed");
            Snapshot::new()
        }
    };

    if token.is_cancelled() {
        return;
    }
    let gathered = sorted_items(published.values().map(|entry| entry.item.clone()));
    if events.send(SearchEvent::GatheringFinished(gathered)).is_err() {
        return;
    }

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !updates_enabled.load(Ordering::Acquire) {
            continue;
        }

        let current = match scan(&config, &predicate).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(scope = %predicate.scope, error = %err, "Rescan failed");
                continue;
            }
        };

        let (changed, removed) = diff(&published, &current);
        published = current;
        if changed.is_empty() && removed.is_empty() {
            continue;
        }
        if token.is_cancelled() {
            break;
        }
        if events.send(SearchEvent::Updated { changed, removed }).is_err() {
            break;
        }
    }

    debug!(scope = %predicate.scope, "Polling search stopped");
}

async fn scan(config: &SearchConfig, predicate: &SearchPredicate) -> io::Result<Snapshot> {
    let config = config.clone();
    let predicate = predicate.clone();
    tokio::task::spawn_blocking(move || walk(&config, &predicate))
        .await
        .map_err(io::Error::other)?
}

/// Walks the scope depth-first without following symlinks
fn walk(config: &SearchConfig, predicate: &SearchPredicate) -> io::Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    let mut pending = vec![predicate.scope.as_path().to_path_buf()];
    let mut is_root = true;

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if is_root => return Err(err),
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "Skipping unreadable directory");
                continue;
            }
        };
        is_root = false;

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !predicate.matches_path(&path) {
                continue;
            }
            if let Some(entry) = read_entry(&path, config, predicate) {
                snapshot.insert(path, entry);
            }
        }
    }

    Ok(snapshot)
}

fn read_entry(path: &Path, config: &SearchConfig, predicate: &SearchPredicate) -> Option<Entry> {
    let item = match read_cloud_item(path, config) {
        Ok(item) => item,
        // Vanished mid-scan
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Unreadable hydration attributes");
            CloudItem::new(path)
        }
    };

    if predicate.downloading_only && item.is_downloading != Some(true) {
        return None;
    }

    let modified = std::fs::symlink_metadata(path)
        .and_then(|m| m.modified())
        .ok();
    Some(Entry { item, modified })
}

/// Items new or different in `current`, and items gone from it
fn diff(published: &Snapshot, current: &Snapshot) -> (Vec<CloudItem>, Vec<CloudItem>) {
    let changed = current
        .iter()
        .filter(|(path, entry)| published.get(*path) != Some(*entry))
        .map(|(_, entry)| entry.item.clone());
    let removed = published
        .iter()
        .filter(|(path, _)| !current.contains_key(*path))
        .map(|(_, entry)| entry.item.clone());

    (sorted_items(changed), sorted_items(removed))
}

fn sorted_items(items: impl Iterator<Item = CloudItem>) -> Vec<CloudItem> {
    let mut items: Vec<CloudItem> = items.collect();
    items.sort_by(|a, b| a.path.cmp(&b.path));
    items
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use syncwatch_core::domain::{NoiseFilter, WatchedResource};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_config() -> SearchConfig {
        SearchConfig {
            poll_interval_ms: 20,
            ..SearchConfig::default()
        }
    }

    fn scope(dir: &Path) -> WatchedResource {
        WatchedResource::new(dir).unwrap()
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SearchEvent>) -> SearchEvent {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for search event")
            .expect("search channel closed")
    }

    fn paths(items: &[CloudItem]) -> Vec<PathBuf> {
        items.iter().map(|i| i.path.clone()).collect()
    }

    #[test]
    fn test_diff_reports_new_modified_and_gone() {
        let a = PathBuf::from("/d/a");
        let b = PathBuf::from("/d/b");
        let c = PathBuf::from("/d/c");
        let entry = |item: CloudItem| Entry {
            item,
            modified: None,
        };

        let published: Snapshot = [
            (a.clone(), entry(CloudItem::downloading(&a, 10.0))),
            (b.clone(), entry(CloudItem::downloaded(&b))),
        ]
        .into_iter()
        .collect();
        let current: Snapshot = [
            (a.clone(), entry(CloudItem::downloading(&a, 20.0))),
            (c.clone(), entry(CloudItem::downloaded(&c))),
        ]
        .into_iter()
        .collect();

        let (changed, removed) = diff(&published, &current);
        assert_eq!(paths(&changed), vec![a, c]);
        assert_eq!(paths(&removed), vec![b]);
    }

    #[test]
    fn test_walk_skips_noise_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.txt"), b"b").unwrap();

        let predicate = SearchPredicate::descendants_of(scope(dir.path()), NoiseFilter::default());
        let snapshot = walk(&SearchConfig::default(), &predicate).unwrap();

        let mut found: Vec<_> = snapshot.keys().cloned().collect();
        found.sort();
        assert_eq!(
            found,
            vec![dir.path().join("a.txt"), dir.path().join("sub").join("b.txt")]
        );
    }

    #[test]
    fn test_downloading_only_excludes_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let predicate =
            SearchPredicate::downloading_within(scope(dir.path()), NoiseFilter::default());
        let snapshot = walk(&SearchConfig::default(), &predicate).unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_scope() {
        let search = PollingXattrSearch::new(fast_config(), Handle::current());
        let predicate = SearchPredicate::descendants_of(
            WatchedResource::new("/nonexistent/syncwatch-scope").unwrap(),
            NoiseFilter::default(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(search.start(predicate, tx).is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_zero_poll_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = SearchConfig {
            poll_interval_ms: 0,
            ..SearchConfig::default()
        };
        let search = PollingXattrSearch::new(config, Handle::current());
        let predicate =
            SearchPredicate::descendants_of(scope(dir.path()), NoiseFilter::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = search.start(predicate, tx).err().expect("zero interval accepted");
        assert!(err.to_string().contains("poll_interval_ms"));
        // No poll task was spawned, so the sender is already gone
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_gathers_then_reports_updates() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        std::fs::write(&first, b"1").unwrap();

        let search = PollingXattrSearch::new(fast_config(), Handle::current());
        let predicate = SearchPredicate::descendants_of(scope(dir.path()), NoiseFilter::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = search.start(predicate, tx).unwrap();

        assert_eq!(next_event(&mut rx).await, SearchEvent::GatheringStarted);
        match next_event(&mut rx).await {
            SearchEvent::GatheringFinished(items) => assert_eq!(paths(&items), vec![first.clone()]),
            other => panic!("expected gathering, got {other:?}"),
        }

        let second = dir.path().join("second.txt");
        std::fs::write(&second, b"2").unwrap();
        match next_event(&mut rx).await {
            SearchEvent::Updated { changed, removed } => {
                assert_eq!(paths(&changed), vec![second.clone()]);
                assert!(removed.is_empty());
            }
            other => panic!("expected update, got {other:?}"),
        }

        std::fs::remove_file(&first).unwrap();
        match next_event(&mut rx).await {
            SearchEvent::Updated { changed, removed } => {
                assert!(changed.is_empty());
                assert_eq!(paths(&removed), vec![first]);
            }
            other => panic!("expected update, got {other:?}"),
        }

        session.stop();
    }

    #[tokio::test]
    async fn test_disabled_session_holds_changes_until_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let search = PollingXattrSearch::new(fast_config(), Handle::current());
        let predicate = SearchPredicate::descendants_of(scope(dir.path()), NoiseFilter::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = search.start(predicate, tx).unwrap();

        assert_eq!(next_event(&mut rx).await, SearchEvent::GatheringStarted);
        assert!(matches!(
            next_event(&mut rx).await,
            SearchEvent::GatheringFinished(items) if items.is_empty()
        ));

        session.disable_updates();
        // Let a scan that began before the pause finish
        tokio::time::sleep(Duration::from_millis(60)).await;
        let file = dir.path().join("late.txt");
        std::fs::write(&file, b"x").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());

        session.enable_updates();
        match next_event(&mut rx).await {
            SearchEvent::Updated { changed, .. } => assert_eq!(paths(&changed), vec![file]),
            other => panic!("expected update, got {other:?}"),
        }
        session.stop();
    }

    #[tokio::test]
    async fn test_stop_closes_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let search = PollingXattrSearch::new(fast_config(), Handle::current());
        let predicate = SearchPredicate::descendants_of(scope(dir.path()), NoiseFilter::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = search.start(predicate, tx).unwrap();

        session.stop();
        session.stop();

        // Drain whatever was sent before the stop; the sender then goes away
        let closed = tokio::time::timeout(WAIT, async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
