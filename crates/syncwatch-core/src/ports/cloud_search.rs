//! Cloud item search port (driven/secondary port)
//!
//! Models a metadata search over a cloud-backed subtree: the facility first
//! gathers the complete result set, then reports incremental diffs as items
//! change or leave the result set.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because search setup failures are adapter-specific.
//! - The event channel is handed over in [`ICloudItemSearch::start`], so the
//!   receiving side exists before the first event can be produced and no early
//!   gathering notification is lost.
//! - Update delivery can be paused with [`ISearchSession::disable_updates`].
//!   A paused session must not drop changes: it reports them, diffed against
//!   what it last delivered, once updates are enabled again.

use tokio::sync::mpsc;

use crate::domain::{CloudItem, SearchPredicate};

// ============================================================================
// SearchEvent
// ============================================================================

/// Notification produced by a running search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// The initial gathering phase has begun
    GatheringStarted,
    /// The initial gathering phase is complete; carries the full result set
    GatheringFinished(Vec<CloudItem>),
    /// Incremental diff against the previously delivered result set
    Updated {
        /// Items that entered the result set or whose attributes changed
        changed: Vec<CloudItem>,
        /// Items that left the result set, with their last known attributes
        removed: Vec<CloudItem>,
    },
}

// ============================================================================
// ISearchSession
// ============================================================================

/// A live search started by [`ICloudItemSearch::start`]
///
/// All methods must be idempotent.
pub trait ISearchSession: Send + Sync {
    /// Resume delivery of [`SearchEvent::Updated`] events
    fn enable_updates(&self);

    /// Pause delivery of [`SearchEvent::Updated`] events
    fn disable_updates(&self);

    /// Stop the search and release its resources
    ///
    /// Events already queued may still be received; consumers discard them.
    fn stop(&self);
}

// ============================================================================
// ICloudItemSearch
// ============================================================================

/// Port trait for starting cloud item searches
///
/// ## Implementation Notes
///
/// - A search starts with updates enabled, sends
///   [`SearchEvent::GatheringStarted`], then exactly one
///   [`SearchEvent::GatheringFinished`], then any number of
///   [`SearchEvent::Updated`] events.
/// - Every reported item must satisfy `predicate.matches_path`; when
///   `predicate.downloading_only` is set, only items with an active download
///   belong to the result set.
/// - Attributes the facility cannot read are reported as `None` rather than
///   failing the whole event.
pub trait ICloudItemSearch: Send + Sync {
    /// Starts a search and returns its session
    ///
    /// # Arguments
    /// * `predicate` - Which items belong to the result set
    /// * `events` - Channel receiving the search's notifications
    ///
    /// # Errors
    /// Returns an error if the search cannot be started
    fn start(
        &self,
        predicate: SearchPredicate,
        events: mpsc::UnboundedSender<SearchEvent>,
    ) -> anyhow::Result<Box<dyn ISearchSession>>;
}
