//! Playback worker
//!
//! Single long-lived task per session. Waits for the first ready track, then
//! pops tracks in upcoming order and binds each to the voice connection,
//! awaiting its completion signal before moving on. Exactly one track is
//! bound at a time.

use crate::error::{Error, Result};
use crate::output::Notice;
use crate::playback::queue::Pop;
use crate::playback::state::{CurrentTrack, SessionShared};
use crate::track::ResolvedTrack;
use crate::voice::{completion_pair, PlaybackOutcome};
use jukebot_common::events::{PlaybackStatus, SessionEvent};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const QUEUE_EMPTY: &str = "No more songs in the queue.";

/// What the loop does after a track
enum Flow {
    Continue,
    Terminated,
}

pub struct PlayerWorker {
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
}

impl PlayerWorker {
    pub fn new(shared: Arc<SessionShared>, cancel: CancellationToken) -> Self {
        Self { shared, cancel }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Playback worker started");
            match self.worker_loop().await {
                Ok(()) => info!("Playback worker stopped"),
                Err(e) => error!("Playback worker exited: {}", e),
            }
        })
    }

    async fn worker_loop(&self) -> Result<()> {
        let shared = &self.shared;

        tokio::select! {
            _ = shared.queue.wait_first_ready() => {}
            _ = self.cancel.cancelled() => return Ok(()),
        }

        let mut idle_announced = false;
        let mut played_any = shared.state.song_counter() > 0;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let changed = shared.queue.changed().notified();

            match shared.queue.pop_ready().await {
                Pop::Ready { track, remaining } => {
                    idle_announced = false;
                    played_any = true;
                    if let Flow::Terminated = self.play(track, remaining).await? {
                        return Ok(());
                    }
                    continue;
                }
                Pop::Pending => {
                    debug!("Head of queue still downloading");
                    shared.inactivity.cancel().await;
                }
                Pop::Drained => {
                    if !idle_announced {
                        idle_announced = true;
                        if played_any {
                            shared.sink.send(Notice::text(QUEUE_EMPTY)).await;
                        }
                    }
                    // Re-armed on every drained wake; an enqueue that came to
                    // nothing has already disarmed it
                    shared.inactivity.arm().await;
                }
            }

            tokio::select! {
                _ = changed => {}
                _ = self.cancel.cancelled() => return Ok(()),
            }
        }
    }

    async fn play(&self, track: ResolvedTrack, remaining: usize) -> Result<Flow> {
        let shared = &self.shared;
        shared.inactivity.cancel().await;

        if self.cancel.is_cancelled() {
            track.discard();
            return Ok(Flow::Terminated);
        }

        let Some(connection) = shared.state.connection().await else {
            return Err(self
                .binding_failed(track, Error::Playback("not connected to a voice channel".to_string()))
                .await);
        };

        let (signal, done) = completion_pair();
        if let Err(e) = connection.play(track.path(), signal).await {
            let e = match e {
                Error::Playback(_) => e,
                other => Error::Playback(other.to_string()),
            };
            return Err(self.binding_failed(track, e).await);
        }

        let song_number = shared.state.next_song_number();
        let current = CurrentTrack {
            id: track.id(),
            title: track.title().to_string(),
            thumbnail: track.thumbnail().map(str::to_string),
        };
        shared.state.set_current(Some(current.clone())).await;
        shared.state.set_remaining(remaining + 1);
        shared.state.set_status(PlaybackStatus::Playing).await;
        info!(id = %current.id, song_number, title = %current.title, "Now playing");

        shared.events.emit_lossy(SessionEvent::TrackStarted {
            track_id: current.id,
            title: current.title.clone(),
            song_number,
            thumbnail: current.thumbnail.clone(),
            timestamp: chrono::Utc::now(),
        });
        shared
            .sink
            .send(Notice::NowPlaying {
                song_number,
                title: current.title.clone(),
                thumbnail: current.thumbnail.clone(),
            })
            .await;

        let outcome = tokio::select! {
            outcome = done => outcome.unwrap_or(PlaybackOutcome::Stopped),
            _ = self.cancel.cancelled() => {
                connection.stop().await;
                track.discard();
                return Ok(Flow::Terminated);
            }
        };

        if let PlaybackOutcome::Failed(reason) = &outcome {
            warn!(id = %current.id, "Stream error, treating as finished: {}", reason);
        }
        track.discard();

        if self.cancel.is_cancelled() {
            return Ok(Flow::Terminated);
        }

        shared.state.set_current(None).await;
        shared.state.set_status(PlaybackStatus::Idle).await;
        shared.events.emit_lossy(SessionEvent::TrackFinished {
            track_id: current.id,
            completed: !matches!(outcome, PlaybackOutcome::Failed(_)),
            timestamp: chrono::Utc::now(),
        });
        Ok(Flow::Continue)
    }

    /// Report once, delete the held file, and hand back the error that ends
    /// the loop
    async fn binding_failed(&self, track: ResolvedTrack, e: Error) -> Error {
        error!(id = %track.id(), "Failed to bind track: {}", e);
        track.discard();
        self.shared.state.set_current(None).await;
        self.shared.state.set_status(PlaybackStatus::Idle).await;
        self.shared.sink.send(Notice::error(e.to_string())).await;
        e
    }
}
