//! Track resolution: turn a user reference into playable local files
//!
//! `inspect` is cheap and never downloads; `fetch` runs the full download and
//! transcode for a single item.

pub mod ytdlp;

use crate::error::{Error, Result};
use crate::scratch::ScratchDir;
use crate::track::{ResolvedTrack, TrackId};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use ytdlp::YtDlpResolver;

/// Title used when the source does not report one
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// One playable child of a playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub reference: String,
    pub title: String,
}

/// Result of inspecting a reference without downloading it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    Single { title: String },
    Playlist { entries: Vec<PlaylistEntry> },
}

impl Inspection {
    /// Flatten into `(reference, title)` items in play order.
    ///
    /// A playlist without entries is `Unsupported`.
    pub fn into_items(self, reference: &str) -> Result<Vec<PlaylistEntry>> {
        match self {
            Inspection::Single { title } => Ok(vec![PlaylistEntry {
                reference: reference.to_string(),
                title,
            }]),
            Inspection::Playlist { entries } if entries.is_empty() => Err(Error::Unsupported(
                "No entries found in playlist.".to_string(),
            )),
            Inspection::Playlist { entries } => Ok(entries),
        }
    }
}

#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Classify a reference as a single item or a bounded playlist
    async fn inspect(&self, reference: &str) -> Result<Inspection>;

    /// Download one item into `dest` as `<id>.<ext>`.
    ///
    /// When `cancel` fires, the download is aborted, every file whose name
    /// starts with `id` is removed, and `Error::Cancelled` is returned.
    async fn fetch(
        &self,
        id: TrackId,
        reference: &str,
        dest: &ScratchDir,
        cancel: CancellationToken,
    ) -> Result<ResolvedTrack>;
}
