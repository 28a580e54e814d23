//! Local filesystem probe
//!
//! [`LocalFileProbe`] implements [`IFileProbe`] over `tokio::fs`, reading the
//! hydration state attribute to decide whether a file is materialized.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use syncwatch_core::config::SearchConfig;
use syncwatch_core::ports::IFileProbe;

use crate::xattr::{read_xattr, HydrationState};

/// Probe backed by the real filesystem
#[derive(Debug, Clone)]
pub struct LocalFileProbe {
    state_xattr: String,
}

impl LocalFileProbe {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            state_xattr: config.state_xattr.clone(),
        }
    }
}

impl Default for LocalFileProbe {
    fn default() -> Self {
        Self::new(&SearchConfig::default())
    }
}

#[async_trait::async_trait]
impl IFileProbe for LocalFileProbe {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    async fn is_materialized(&self, path: &Path) -> anyhow::Result<bool> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to stat {}", path.display()))
            }
        }

        let owned = path.to_path_buf();
        let name = self.state_xattr.clone();
        let raw = tokio::task::spawn_blocking(move || read_xattr(&owned, &name))
            .await
            .context("xattr reader task failed")?
            .with_context(|| format!("Failed to read hydration state of {}", path.display()))?;

        // No state attribute: an ordinary local file
        let Some(raw) = raw else {
            return Ok(true);
        };

        HydrationState::parse(&raw)
            .map(HydrationState::is_materialized)
            .ok_or_else(|| {
                anyhow!(
                    "Unrecognized hydration state {:?} on {}",
                    String::from_utf8_lossy(&raw),
                    path.display()
                )
            })
    }

    async fn list_children(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            children.push(entry.path());
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exists() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();

        let probe = LocalFileProbe::default();
        assert!(probe.exists(&file).await);
        assert!(probe.exists(dir.path()).await);
        assert!(!probe.exists(&dir.path().join("missing")).await);
    }

    #[tokio::test]
    async fn test_plain_file_is_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();

        let probe = LocalFileProbe::default();
        assert!(probe.is_materialized(&file).await.unwrap());
        assert!(!probe
            .is_materialized(&dir.path().join("missing"))
            .await
            .unwrap());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_state_attribute_decides_materialization() {
        use crate::xattr::{user_xattrs_supported, write_xattr, STATE_XATTR};

        let dir = tempfile::tempdir().unwrap();
        if !user_xattrs_supported(dir.path()) {
            eprintln!("skipping: user xattrs unsupported on temp filesystem");
            return;
        }
        let file = dir.path().join("doc.pdf");
        std::fs::write(&file, b"").unwrap();
        let probe = LocalFileProbe::default();

        write_xattr(&file, STATE_XATTR, b"Online").unwrap();
        assert!(!probe.is_materialized(&file).await.unwrap());

        write_xattr(&file, STATE_XATTR, b"Pinned").unwrap();
        assert!(probe.is_materialized(&file).await.unwrap());

        write_xattr(&file, STATE_XATTR, b"Bogus").unwrap();
        assert!(probe.is_materialized(&file).await.is_err());
    }

    #[tokio::test]
    async fn test_list_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("nested"), b"").unwrap();

        let probe = LocalFileProbe::default();
        let mut children = probe.list_children(dir.path()).await.unwrap();
        children.sort();
        assert_eq!(
            children,
            vec![dir.path().join("a"), dir.path().join("sub")]
        );

        let err = probe
            .list_children(&dir.path().join("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
