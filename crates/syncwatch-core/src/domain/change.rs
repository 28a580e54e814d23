//! Change batches, directory snapshots and raw search items

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One watch update as delivered to a cloud change callback
///
/// Produced once per search event and handed to the caller by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// Items seen for the first time
    pub added: Vec<PathBuf>,
    /// Items already known whose metadata changed
    pub changed: Vec<PathBuf>,
    /// Items confirmed to be gone from disk
    pub removed: Vec<PathBuf>,
    /// True for the first full enumeration of the watched location
    pub is_initial_fetch: bool,
}

impl ChangeBatch {
    /// Added and changed items, in that order
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.added.iter().chain(self.changed.iter())
    }

    /// Returns true if the batch carries any added or changed item
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.changed.is_empty()
    }
}

/// Full listing of a local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// The directory that was listed
    pub directory: PathBuf,
    /// Immediate children, noise files excluded, sorted
    pub children: Vec<PathBuf>,
    /// True exactly once per monitor, for the first successful listing
    pub is_initial_fetch: bool,
}

/// Download condition derived from a [`CloudItem`]'s attributes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadState {
    /// Bytes are being fetched; carries clamped progress in `0.0..=1.0`
    Downloading(f64),
    /// The item is fully materialized
    Complete,
    /// Neither downloading nor present locally
    Idle,
    /// Attributes were missing or unreadable
    Unknown,
}

/// A single item as reported by a cloud search facility
///
/// Every attribute is optional: `None` means the facility could not read it,
/// which callers treat as a per-item failure and skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudItem {
    /// Location of the item
    pub path: PathBuf,
    /// Whether bytes are currently being downloaded
    pub is_downloading: Option<bool>,
    /// Whether the item is fully present on local storage
    pub is_downloaded: Option<bool>,
    /// Download percentage in `0..=100`
    pub percent_downloaded: Option<f64>,
}

impl CloudItem {
    /// Creates an item with no attributes
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_downloading: None,
            is_downloaded: None,
            percent_downloaded: None,
        }
    }

    /// Creates an item that is downloading at `percent`
    pub fn downloading(path: impl Into<PathBuf>, percent: f64) -> Self {
        Self {
            path: path.into(),
            is_downloading: Some(true),
            is_downloaded: Some(false),
            percent_downloaded: Some(percent),
        }
    }

    /// Creates an item that is fully downloaded
    pub fn downloaded(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_downloading: Some(false),
            is_downloaded: Some(true),
            percent_downloaded: Some(100.0),
        }
    }

    /// Creates a placeholder that is not downloading and not present
    pub fn online_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_downloading: Some(false),
            is_downloaded: Some(false),
            percent_downloaded: None,
        }
    }

    /// Classify the item's download condition
    ///
    /// A percentage of 100 or more counts as complete even when the
    /// downloaded flag is missing.
    #[must_use]
    pub fn download_state(&self) -> DownloadState {
        let percent_complete = self.percent_downloaded.is_some_and(|p| p >= 100.0);
        if self.is_downloaded == Some(true) || percent_complete {
            return DownloadState::Complete;
        }

        match (self.is_downloading, self.percent_downloaded) {
            (Some(true), Some(percent)) => match clamp_progress(percent / 100.0) {
                Some(progress) if progress >= 1.0 => DownloadState::Complete,
                Some(progress) => DownloadState::Downloading(progress),
                None => DownloadState::Unknown,
            },
            (Some(true), None) => DownloadState::Unknown,
            (Some(false), _) => DownloadState::Idle,
            (None, _) => DownloadState::Unknown,
        }
    }
}

/// Clamp a progress fraction into `0.0..=1.0`
///
/// Returns `None` for NaN, which carries no usable information.
#[must_use]
pub fn clamp_progress(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value.clamp(0.0, 1.0))
    }
}
