//! Extended attribute access for Files-on-Demand mounts
//!
//! FUSE-backed Files-on-Demand mounts publish the hydration state of each file
//! through extended attributes:
//!
//! - `user.lnxdrive.state` - `Online`, `Hydrating`, `Hydrated`, `Pinned`,
//!   `Modified`, `Conflicted`, `Error` or `Deleted`
//! - `user.lnxdrive.progress` - download percentage `0`..`100`, only while
//!   `Hydrating`
//!
//! Files without a state attribute are ordinary local files.
//!
//! The defaults below match LNXDrive mounts; `search.state_xattr` and
//! `search.progress_xattr` override them.

use std::io;
use std::path::Path;
use std::str::FromStr;

use syncwatch_core::config::SearchConfig;
use syncwatch_core::domain::CloudItem;

/// Default attribute carrying the hydration state
pub const STATE_XATTR: &str = "user.lnxdrive.state";

/// Default attribute carrying the download percentage
pub const PROGRESS_XATTR: &str = "user.lnxdrive.progress";

// ============================================================================
// HydrationState
// ============================================================================

/// Hydration state published by a Files-on-Demand mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HydrationState {
    /// Placeholder only; content lives in the cloud
    Online,
    /// Content is being downloaded
    Hydrating,
    /// Content is fully present
    Hydrated,
    /// Content is present and kept offline
    Pinned,
    /// Content is present with local changes
    Modified,
    /// Content is present but conflicts with the remote version
    Conflicted,
    /// The last operation on the file failed
    Error,
    /// The file is pending deletion
    Deleted,
}

impl HydrationState {
    /// Name as written to the state attribute
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Hydrating => "Hydrating",
            Self::Hydrated => "Hydrated",
            Self::Pinned => "Pinned",
            Self::Modified => "Modified",
            Self::Conflicted => "Conflicted",
            Self::Error => "Error",
            Self::Deleted => "Deleted",
        }
    }

    /// Parses a raw attribute value, tolerating trailing NULs and whitespace
    pub fn parse(raw: &[u8]) -> Option<Self> {
        std::str::from_utf8(raw)
            .ok()?
            .trim_end_matches('\0')
            .trim()
            .parse()
            .ok()
    }

    /// Returns true if the file's bytes are fully on local storage
    pub fn is_materialized(self) -> bool {
        matches!(
            self,
            Self::Hydrated | Self::Pinned | Self::Modified | Self::Conflicted
        )
    }
}

impl FromStr for HydrationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Online" => Ok(Self::Online),
            "Hydrating" => Ok(Self::Hydrating),
            "Hydrated" => Ok(Self::Hydrated),
            "Pinned" => Ok(Self::Pinned),
            "Modified" => Ok(Self::Modified),
            "Conflicted" => Ok(Self::Conflicted),
            "Error" => Ok(Self::Error),
            "Deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown hydration state '{other}'")),
        }
    }
}

/// Parses a percentage attribute value
pub fn parse_percent(raw: &[u8]) -> Option<f64> {
    std::str::from_utf8(raw)
        .ok()?
        .trim_end_matches('\0')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
}

// ============================================================================
// Raw attribute access
// ============================================================================

/// Reads extended attribute `name` of `path`
///
/// Returns `Ok(None)` when the attribute is absent or the filesystem does not
/// support extended attributes.
#[cfg(target_os = "linux")]
pub fn read_xattr(path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
    let c_path = c_string(std::os::unix::ffi::OsStrExt::as_bytes(path.as_os_str()))?;
    let c_name = c_string(name.as_bytes())?;

    loop {
        // SAFETY: both strings are NUL-terminated; a null buffer of size 0
        // only queries the value length.
        let size = unsafe {
            libc::getxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0)
        };
        if size < 0 {
            return absent_or(io::Error::last_os_error());
        }

        let mut buf = vec![0u8; size as usize];
        if buf.is_empty() {
            return Ok(Some(buf));
        }

        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let read = unsafe {
            libc::getxattr(
                c_path.as_ptr(),
                c_name.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        if read < 0 {
            let err = io::Error::last_os_error();
            // Value grew between the two calls
            if err.raw_os_error() == Some(libc::ERANGE) {
                continue;
            }
            return absent_or(err);
        }

        buf.truncate(read as usize);
        return Ok(Some(buf));
    }
}

#[cfg(not(target_os = "linux"))]
pub fn read_xattr(_path: &Path, _name: &str) -> io::Result<Option<Vec<u8>>> {
    Ok(None)
}

#[cfg(target_os = "linux")]
fn absent_or(err: io::Error) -> io::Result<Option<Vec<u8>>> {
    match err.raw_os_error() {
        Some(libc::ENODATA) | Some(libc::ENOTSUP) => Ok(None),
        _ => Err(err),
    }
}

#[cfg(target_os = "linux")]
fn c_string(bytes: &[u8]) -> io::Result<std::ffi::CString> {
    std::ffi::CString::new(bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interior NUL byte"))
}

/// Sets extended attribute `name` of `path`
#[cfg(all(test, target_os = "linux"))]
pub(crate) fn write_xattr(path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
    let c_path = c_string(std::os::unix::ffi::OsStrExt::as_bytes(path.as_os_str()))?;
    let c_name = c_string(name.as_bytes())?;

    // SAFETY: strings are NUL-terminated and `value` is valid for reads.
    let rc = unsafe {
        libc::setxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Returns false when the filesystem backing `dir` rejects user xattrs
#[cfg(all(test, target_os = "linux"))]
pub(crate) fn user_xattrs_supported(dir: &Path) -> bool {
    let probe = dir.join(".xattr-probe");
    if std::fs::write(&probe, b"").is_err() {
        return false;
    }
    let supported = write_xattr(&probe, "user.syncwatch.probe", b"1").is_ok();
    let _ = std::fs::remove_file(&probe);
    supported
}

// ============================================================================
// CloudItem extraction
// ============================================================================

/// Builds a [`CloudItem`] for `path` from its hydration attributes
///
/// Unreadable or unrecognized attributes leave the corresponding fields
/// `None` so callers can skip the item.
pub fn read_cloud_item(path: &Path, config: &SearchConfig) -> io::Result<CloudItem> {
    let Some(raw_state) = read_xattr(path, &config.state_xattr)? else {
        return Ok(CloudItem::downloaded(path));
    };

    let item = match HydrationState::parse(&raw_state) {
        None => CloudItem::new(path),
        Some(HydrationState::Hydrating) => {
            let percent = read_xattr(path, &config.progress_xattr)?
                .as_deref()
                .and_then(parse_percent);
            CloudItem {
                path: path.to_path_buf(),
                is_downloading: Some(true),
                is_downloaded: Some(false),
                percent_downloaded: percent,
            }
        }
        Some(state) if state.is_materialized() => CloudItem::downloaded(path),
        Some(_) => CloudItem::online_only(path),
    };
    Ok(item)
}
