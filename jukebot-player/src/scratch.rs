//! Scratch directory for downloaded audio
//!
//! Files are named by track id (`<id>.<ext>`), so everything belonging to a
//! track can be found by prefix.

use crate::error::Result;
use crate::track::TrackId;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Sub-directory owned by one session
    pub fn child(&self, name: &str) -> ScratchDir {
        ScratchDir::new(self.root.join(name))
    }

    /// Create the directory (and parents) if missing
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// `<root>/<id>.%(ext)s` output template for the media tool
    pub fn output_template(&self, id: TrackId) -> PathBuf {
        self.root.join(format!("{}.%(ext)s", id))
    }

    /// Remove everything under the directory, keeping the directory itself.
    /// A missing directory counts as already empty.
    pub async fn purge(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to purge {}: {}", path.display(), e),
            }
        }
        debug!("Purged {} entries from {}", removed, self.root.display());
        Ok(removed)
    }

    /// Remove every file whose name starts with the track id
    pub async fn remove_by_id(&self, id: TrackId) -> usize {
        let prefix = id.to_string();
        let mut removed = 0;
        for path in self.files().await {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            if matches && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Regular files directly under the directory
    pub async fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return files;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        files
    }
}
