//! Session event types and the broadcast EventBus
//!
//! Events are emitted by the playback session and fanned out to any number of
//! subscribers (SSE clients, tests, loggers).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Playback status of a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// Nothing bound to the output
    #[default]
    Idle,
    /// A track is bound and audible
    Playing,
    /// A track is bound but paused
    Paused,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Idle => write!(f, "idle"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Events emitted by a playback session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A track reference was accepted into the upcoming queue
    TrackQueued {
        track_id: Uuid,
        title: String,
        /// 1-based position in the upcoming list after insertion
        position: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Download finished and the track is ready to play
    TrackReady {
        track_id: Uuid,
        title: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track was bound to the output
    TrackStarted {
        track_id: Uuid,
        title: String,
        /// Running song counter for this session
        song_number: u64,
        thumbnail: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track finished (naturally, skipped, or failed mid-stream)
    TrackFinished {
        track_id: Uuid,
        /// False when the output reported a stream error
        completed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Resolution or download failed; the entry was dropped
    DownloadFailed {
        track_id: Uuid,
        reference: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Upcoming entries were dropped (clear or skip-to)
    QueueCleared {
        /// Number of upcoming entries removed
        dropped: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback status changed
    PlaybackStateChanged {
        old_state: PlaybackStatus,
        new_state: PlaybackStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session was stopped and its state reset
    SessionStopped {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SessionEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::TrackQueued { .. } => "TrackQueued",
            SessionEvent::TrackReady { .. } => "TrackReady",
            SessionEvent::TrackStarted { .. } => "TrackStarted",
            SessionEvent::TrackFinished { .. } => "TrackFinished",
            SessionEvent::DownloadFailed { .. } => "DownloadFailed",
            SessionEvent::QueueCleared { .. } => "QueueCleared",
            SessionEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            SessionEvent::SessionStopped { .. } => "SessionStopped",
        }
    }
}

/// Broadcast channel for session events
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
