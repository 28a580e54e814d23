//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the boundaries between the monitoring engine and the platform.
//! The engine depends on these traits; adapters in `syncwatch-monitor` and
//! in-memory fakes in tests implement them.
//!
//! ## Ports Overview
//!
//! - [`ICloudItemSearch`] / [`ISearchSession`] - Cloud-sync metadata search with
//!   an initial gathering phase and incremental updates
//! - [`IFileProbe`] - Existence, materialization and directory listing checks
//! - [`WatchHandle`] - Cancellation guard returned by every `start()`

pub mod cloud_search;
pub mod local_filesystem;

pub use cloud_search::{ICloudItemSearch, ISearchSession, SearchEvent};
pub use local_filesystem::{IFileProbe, WatchHandle};
