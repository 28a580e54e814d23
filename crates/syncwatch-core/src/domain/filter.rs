//! Noise-file filtering and search predicates

use std::ffi::OsStr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::resource::WatchedResource;

/// Default set of filesystem noise files that are never reported
pub const DEFAULT_NOISE_FILES: &[&str] = &[
    ".DS_Store",
    ".localized",
    ".directory",
    "Thumbs.db",
    "desktop.ini",
];

/// Set of file names that carry no user-visible content
///
/// Matching is by exact final path component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoiseFilter {
    names: Vec<String>,
}

impl NoiseFilter {
    /// Creates a filter from the given names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the path's final component is a noise file
    #[must_use]
    pub fn is_noise(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| self.names.iter().any(|n| n == name))
    }

    /// The configured names
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_FILES.iter().copied())
    }
}

/// Predicate handed to a cloud item search
///
/// Items match when they lie strictly below `scope` and are not noise files.
/// When `downloading_only` is set the search should additionally restrict
/// results to items currently being downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPredicate {
    /// Root of the searched subtree; never itself a result
    pub scope: WatchedResource,
    /// Names excluded from results
    pub noise: NoiseFilter,
    /// Restrict results to items with an active download
    pub downloading_only: bool,
}

impl SearchPredicate {
    /// Predicate for every descendant of `scope`
    pub fn descendants_of(scope: WatchedResource, noise: NoiseFilter) -> Self {
        Self {
            scope,
            noise,
            downloading_only: false,
        }
    }

    /// Predicate for descendants of `scope` that are being downloaded
    pub fn downloading_within(scope: WatchedResource, noise: NoiseFilter) -> Self {
        Self {
            scope,
            noise,
            downloading_only: true,
        }
    }

    /// Path part of the predicate; attribute filtering is up to the search
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        self.scope.is_ancestor_of(path) && !self.noise.is_noise(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_noise_filter() {
        let filter = NoiseFilter::default();
        assert!(filter.is_noise(Path::new("/d/.DS_Store")));
        assert!(filter.is_noise(Path::new("/d/sub/Thumbs.db")));
        assert!(!filter.is_noise(Path::new("/d/report.pdf")));
        assert!(!filter.is_noise(Path::new("/")));
    }

    #[test]
    fn test_custom_noise_filter() {
        let filter = NoiseFilter::new(["~lock"]);
        assert!(filter.is_noise(Path::new("/d/~lock")));
        assert!(!filter.is_noise(Path::new("/d/.DS_Store")));
        assert_eq!(filter.names(), ["~lock".to_string()]);
    }

    #[test]
    fn test_predicate_excludes_scope_and_noise() {
        let scope = WatchedResource::new("/cloud/Docs/").unwrap();
        let predicate = SearchPredicate::descendants_of(scope, NoiseFilter::default());

        assert!(predicate.matches_path(Path::new("/cloud/Docs/a.txt")));
        assert!(predicate.matches_path(Path::new("/cloud/Docs/sub/b.txt")));
        assert!(!predicate.matches_path(Path::new("/cloud/Docs")));
        assert!(!predicate.matches_path(Path::new("/cloud/Docs/.DS_Store")));
        assert!(!predicate.matches_path(Path::new("/cloud/Docs-old/a.txt")));
        assert!(!predicate.downloading_only);
    }

    #[test]
    fn test_downloading_predicate_flag() {
        let scope = WatchedResource::new("/cloud").unwrap();
        let predicate = SearchPredicate::downloading_within(scope, NoiseFilter::default());
        assert!(predicate.downloading_only);
    }
}
