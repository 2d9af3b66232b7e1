//! Output collaborator: where user-visible notices go

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

pub const NO_CURRENT_SONG: &str = "No song is currently playing.";
pub const EMPTY_QUEUE: &str = "The queue is empty.";

/// Snapshot of what is playing and what comes next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueView {
    pub now_playing: String,
    pub thumbnail: Option<String>,
    /// `"{i}. {title}"`, 1-based; a single "The queue is empty." line when empty
    pub upcoming: Vec<String>,
}

impl QueueView {
    pub fn is_empty(&self) -> bool {
        self.upcoming.len() == 1 && self.upcoming[0] == EMPTY_QUEUE
    }
}

/// A message for the text channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Text { message: String },
    NowPlaying {
        song_number: u64,
        title: String,
        thumbnail: Option<String>,
    },
    Queue { view: QueueView },
    Error { message: String },
}

impl Notice {
    pub fn text(message: impl Into<String>) -> Self {
        Notice::Text {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice::Error {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Text { message } | Notice::Error { message } => f.write_str(message),
            Notice::NowPlaying {
                song_number, title, ..
            } => write!(f, "Now Playing: Song #{} {}", song_number, title),
            Notice::Queue { view } => {
                write!(f, "Now Playing: {}", view.now_playing)?;
                for line in &view.upcoming {
                    write!(f, "\n{}", line)?;
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn send(&self, notice: Notice);
}

/// Sink that writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl OutputSink for LogSink {
    async fn send(&self, notice: Notice) {
        match &notice {
            Notice::Error { .. } => warn!(target: "jukebot::notice", "{}", notice),
            _ => info!(target: "jukebot::notice", "{}", notice),
        }
    }
}
