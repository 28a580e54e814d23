//! Watched resources and subscription identifiers
//!
//! A [`WatchedResource`] names a filesystem location by its normalized path.
//! Two resources are equal when their normalized paths are equal, so
//! `/data/docs` and `/data/docs/` (or `/data/./docs`) refer to the same
//! resource regardless of how the caller spelled them.

use std::ffi::OsStr;
use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// SubscriptionId
// ============================================================================

/// Opaque token identifying one progress subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random SubscriptionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid UUID: {e}")))
    }
}

// ============================================================================
// MatchPolicy
// ============================================================================

/// How a subscriber's resource is compared against items reported by a search
///
/// `FullPath` is exact. `FileName` compares only the final path component and
/// exists for search facilities that report items under an identity that does
/// not depend on where the file is materialized; two resources with the same
/// name in different directories will then share notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Match on the complete normalized path
    #[default]
    FullPath,
    /// Match on the final path component only
    FileName,
}

// ============================================================================
// WatchedResource
// ============================================================================

/// A watched file or directory, identified by its normalized absolute path
///
/// Normalization resolves `.` and `..` lexically and drops any trailing
/// separator. The filesystem is never consulted, so resources may name paths
/// that do not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PathBuf", into = "PathBuf")]
pub struct WatchedResource(PathBuf);

impl WatchedResource {
    /// Create a new WatchedResource, validating it is absolute
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is relative or escapes
    /// the filesystem root via `..`
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Path must be absolute: {}",
                path.display()
            )));
        }

        Ok(Self(normalize_path(&path)?))
    }

    /// Get the normalized path
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Final path component, `None` for the filesystem root
    #[must_use]
    pub fn file_name(&self) -> Option<&OsStr> {
        self.0.file_name()
    }

    /// Returns true if `path` lies strictly below this resource
    ///
    /// Comparison is component-wise, which gives the same answer as a prefix
    /// test against the separator-terminated form of this path: `/a/bc` is not
    /// below `/a/b`, and `/a/b` is not below itself.
    #[must_use]
    pub fn is_ancestor_of(&self, path: &Path) -> bool {
        match normalize_path(path) {
            Ok(normalized) => normalized != self.0 && normalized.starts_with(&self.0),
            Err(_) => false,
        }
    }

    /// Returns true if an item reported at `path` refers to this resource
    #[must_use]
    pub fn matches(&self, path: &Path, policy: MatchPolicy) -> bool {
        match policy {
            MatchPolicy::FullPath => normalize_path(path).is_ok_and(|p| p == self.0),
            MatchPolicy::FileName => match (self.file_name(), path.file_name()) {
                (Some(mine), Some(theirs)) => mine == theirs,
                _ => false,
            },
        }
    }

    /// Convert to owned PathBuf
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

/// Normalize a path by resolving `.` and `..` components
///
/// Trailing separators disappear as a side effect of rebuilding the path from
/// its components.
pub fn normalize_path(path: &Path) -> Result<PathBuf, DomainError> {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => normalized.push(p.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(DomainError::InvalidPath(
                        "Path escapes root via ..".to_string(),
                    ));
                }
            }
            Component::Normal(c) => normalized.push(c),
        }
    }

    Ok(normalized)
}

impl Display for WatchedResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl TryFrom<PathBuf> for WatchedResource {
    type Error = DomainError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

impl From<WatchedResource> for PathBuf {
    fn from(resource: WatchedResource) -> Self {
        resource.0
    }
}

impl AsRef<Path> for WatchedResource {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
