//! In-memory port implementations shared by the integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use syncwatch_core::domain::SearchPredicate;
use syncwatch_core::ports::{ICloudItemSearch, IFileProbe, ISearchSession, SearchEvent};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(5);

/// Receives the next value or panics after [`WAIT`]
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("callback channel closed")
}

/// Asserts that nothing arrives within `within`
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>, within: Duration) {
    if let Ok(Some(value)) = tokio::time::timeout(within, rx.recv()).await {
        panic!("unexpected callback: {value:?}");
    }
}

/// Lets spawned worker tasks process what has been sent so far
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// FakeSearch
// ============================================================================

struct LiveSearch {
    session_id: usize,
    predicate: SearchPredicate,
    events: mpsc::UnboundedSender<SearchEvent>,
}

#[derive(Default)]
struct FakeSearchState {
    starts: usize,
    stops: usize,
    fail_next: bool,
    live: Option<LiveSearch>,
    toggles: Vec<bool>,
}

/// Search facility driven by the test through [`FakeSearch::emit`]
#[derive(Clone, Default)]
pub struct FakeSearch {
    state: Arc<Mutex<FakeSearchState>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `start` call fail
    pub fn fail_next_start(&self) {
        self.state.lock().fail_next = true;
    }

    /// Sends an event to the live search; returns false if none is running
    pub fn emit(&self, event: SearchEvent) -> bool {
        let state = self.state.lock();
        match &state.live {
            Some(live) => live.events.send(event).is_ok(),
            None => false,
        }
    }

    pub fn starts(&self) -> usize {
        self.state.lock().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().live.is_some()
    }

    pub fn predicate(&self) -> Option<SearchPredicate> {
        self.state.lock().live.as_ref().map(|l| l.predicate.clone())
    }

    /// Sequence of enable (true) / disable (false) calls
    pub fn toggles(&self) -> Vec<bool> {
        self.state.lock().toggles.clone()
    }
}

impl ICloudItemSearch for FakeSearch {
    fn start(
        &self,
        predicate: SearchPredicate,
        events: mpsc::UnboundedSender<SearchEvent>,
    ) -> anyhow::Result<Box<dyn ISearchSession>> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            anyhow::bail!("search facility unavailable");
        }
        state.starts += 1;
        let session_id = state.starts;
        state.live = Some(LiveSearch {
            session_id,
            predicate,
            events,
        });

        Ok(Box::new(FakeSession {
            session_id,
            stopped: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    session_id: usize,
    stopped: AtomicBool,
    state: Arc<Mutex<FakeSearchState>>,
}

impl ISearchSession for FakeSession {
    fn enable_updates(&self) {
        self.state.lock().toggles.push(true);
    }

    fn disable_updates(&self) {
        self.state.lock().toggles.push(false);
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        state.stops += 1;
        if state
            .live
            .as_ref()
            .is_some_and(|live| live.session_id == self.session_id)
        {
            state.live = None;
        }
    }
}

// ============================================================================
// FakeProbe
// ============================================================================

#[derive(Default)]
struct FakeProbeState {
    existing: HashSet<PathBuf>,
    materialized: HashSet<PathBuf>,
}

/// Probe answering from in-memory sets
#[derive(Clone, Default)]
pub struct FakeProbe {
    state: Arc<Mutex<FakeProbeState>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>) {
        self.state.lock().existing.insert(path.into());
    }

    pub fn remove_file(&self, path: &Path) {
        let mut state = self.state.lock();
        state.existing.remove(path);
        state.materialized.remove(path);
    }

    pub fn materialize(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.state.lock();
        state.existing.insert(path.clone());
        state.materialized.insert(path);
    }
}

#[async_trait::async_trait]
impl IFileProbe for FakeProbe {
    async fn exists(&self, path: &Path) -> bool {
        self.state.lock().existing.contains(path)
    }

    async fn is_materialized(&self, path: &Path) -> anyhow::Result<bool> {
        Ok(self.state.lock().materialized.contains(path))
    }

    async fn list_children(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state.lock();
        if !state.existing.contains(dir) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(state
            .existing
            .iter()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }
}
