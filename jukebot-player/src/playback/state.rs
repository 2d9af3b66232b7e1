//! Shared session state
//!
//! Everything the workers and the session controller touch concurrently.

use crate::output::OutputSink;
use crate::playback::inactivity::InactivityTimer;
use crate::playback::queue::PlayQueue;
use crate::playback::requests::RequestQueue;
use crate::resolver::TrackResolver;
use crate::scratch::ScratchDir;
use crate::track::TrackId;
use crate::voice::VoiceConnection;
use jukebot_common::events::{EventBus, PlaybackStatus, SessionEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Track currently bound to the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentTrack {
    pub id: TrackId,
    pub title: String,
    pub thumbnail: Option<String>,
}

/// Playback status, current track and counters
///
/// Uses RwLock for concurrent read access with rare writes
pub struct SessionState {
    status: RwLock<PlaybackStatus>,
    current: RwLock<Option<CurrentTrack>>,
    connection: RwLock<Option<Arc<dyn VoiceConnection>>>,
    song_counter: AtomicU64,
    /// Current track plus upcoming entries when the track started
    remaining: AtomicUsize,
    events: EventBus,
}

impl SessionState {
    pub fn new(events: EventBus) -> Self {
        Self {
            status: RwLock::new(PlaybackStatus::Idle),
            current: RwLock::new(None),
            connection: RwLock::new(None),
            song_counter: AtomicU64::new(0),
            remaining: AtomicUsize::new(0),
            events,
        }
    }

    pub async fn status(&self) -> PlaybackStatus {
        *self.status.read().await
    }

    /// Change status, emitting `PlaybackStateChanged` on an actual change
    pub async fn set_status(&self, new_state: PlaybackStatus) {
        let old_state = {
            let mut status = self.status.write().await;
            std::mem::replace(&mut *status, new_state)
        };
        if old_state != new_state {
            debug!(%old_state, %new_state, "Playback status changed");
            self.events.emit_lossy(SessionEvent::PlaybackStateChanged {
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    pub async fn current(&self) -> Option<CurrentTrack> {
        self.current.read().await.clone()
    }

    pub async fn set_current(&self, track: Option<CurrentTrack>) {
        *self.current.write().await = track;
    }

    pub async fn connection(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.connection.read().await.clone()
    }

    /// Replace the connection, returning the previous one
    pub async fn replace_connection(
        &self,
        connection: Option<Arc<dyn VoiceConnection>>,
    ) -> Option<Arc<dyn VoiceConnection>> {
        std::mem::replace(&mut *self.connection.write().await, connection)
    }

    /// Increment and return the running song counter
    pub fn next_song_number(&self) -> u64 {
        self.song_counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn song_counter(&self) -> u64 {
        self.song_counter.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn set_remaining(&self, remaining: usize) {
        self.remaining.store(remaining, Ordering::Release);
    }

    /// Back to a fresh session; the connection is left to the caller
    pub async fn reset(&self) {
        self.set_status(PlaybackStatus::Idle).await;
        self.set_current(None).await;
        self.song_counter.store(0, Ordering::Release);
        self.remaining.store(0, Ordering::Release);
    }
}

/// The download currently running, so skip/clear can cancel it
#[derive(Default)]
pub struct InFlight {
    slot: Mutex<Option<(TrackId, CancellationToken)>>,
}

impl InFlight {
    pub async fn begin(&self, id: TrackId, token: CancellationToken) {
        *self.slot.lock().await = Some((id, token));
    }

    pub async fn finish(&self) {
        self.slot.lock().await.take();
    }

    pub async fn current(&self) -> Option<TrackId> {
        self.slot.lock().await.as_ref().map(|(id, _)| *id)
    }

    /// Cancel the running fetch if `dropped` says its track is gone
    pub async fn cancel_if(&self, dropped: impl Fn(TrackId) -> bool) -> bool {
        let slot = self.slot.lock().await;
        match slot.as_ref() {
            Some((id, token)) if dropped(*id) => {
                debug!(%id, "Cancelling in-flight download");
                token.cancel();
                true
            }
            _ => false,
        }
    }
}

/// Collaborators and shared structures used by both workers
pub struct SessionShared {
    pub resolver: Arc<dyn TrackResolver>,
    pub sink: Arc<dyn OutputSink>,
    pub events: EventBus,
    pub queue: PlayQueue,
    pub requests: RequestQueue,
    pub state: SessionState,
    pub in_flight: InFlight,
    pub inactivity: Arc<InactivityTimer>,
    /// Per-session download directory
    pub scratch: ScratchDir,
}
