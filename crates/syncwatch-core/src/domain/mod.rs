//! Domain entities
//!
//! - Watched resources and subscription identifiers
//! - Change batches, directory snapshots and raw cloud items
//! - Search predicates and noise-file filtering
//! - Domain-specific error types

pub mod change;
pub mod errors;
pub mod filter;
pub mod resource;

pub use change::{clamp_progress, ChangeBatch, CloudItem, DirectorySnapshot, DownloadState};
pub use errors::DomainError;
pub use filter::{NoiseFilter, SearchPredicate};
pub use resource::{MatchPolicy, SubscriptionId, WatchedResource};
