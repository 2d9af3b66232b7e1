//! Track requests, upcoming entries and resolved tracks
//!
//! One UUID follows a track through its whole life: it names the upcoming
//! entry, the download request, the resolved track and the file on disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique track identifier assigned at enqueue time
pub type TrackId = Uuid;

/// Where a new block of tracks lands in the upcoming list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    /// Behind everything already queued
    #[default]
    Append,
    /// Ahead of everything already queued, block order preserved
    PlayNext,
}

/// Pending download consumed by the download worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub id: TrackId,
    pub reference: String,
    pub priority: RequestPriority,
}

/// A not-yet-playing track as shown in the queue view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingEntry {
    pub id: TrackId,
    pub reference: String,
    pub title: String,
}

impl UpcomingEntry {
    pub fn new(reference: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference: reference.into(),
            title: title.into(),
        }
    }

    pub fn request(&self, priority: RequestPriority) -> TrackRequest {
        TrackRequest {
            id: self.id,
            reference: self.reference.clone(),
            priority,
        }
    }
}

/// A downloaded track backed by a file in the scratch directory
///
/// Not `Clone`: exactly one party owns the file at a time. The owner deletes
/// it with [`ResolvedTrack::discard`]; dropping an undiscarded track deletes
/// the file as well.
#[derive(Debug)]
pub struct ResolvedTrack {
    id: TrackId,
    path: PathBuf,
    title: String,
    thumbnail: Option<String>,
    discarded: bool,
}

impl ResolvedTrack {
    pub fn new(
        id: TrackId,
        path: impl Into<PathBuf>,
        title: impl Into<String>,
        thumbnail: Option<String>,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            title: title.into(),
            thumbnail,
            discarded: false,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    /// Delete the backing file, consuming the track
    pub fn discard(mut self) {
        self.remove_file();
    }

    fn remove_file(&mut self) {
        if self.discarded {
            return;
        }
        self.discarded = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed track file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for ResolvedTrack {
    fn drop(&mut self) {
        self.remove_file();
    }
}
