//! Session controller
//!
//! A `Session` is a cloneable handle over one voice session: its connection,
//! queues, workers and inactivity timer. Commands call straight into it; there
//! is no global instance.

use crate::config::SessionSettings;
use crate::error::{Error, Result};
use crate::output::{Notice, OutputSink, QueueView, EMPTY_QUEUE, NO_CURRENT_SONG};
use crate::playback::download_worker::DownloadWorker;
use crate::playback::inactivity::{FireFn, InactivityTimer};
use crate::playback::player_worker::PlayerWorker;
use crate::playback::queue::PlayQueue;
use crate::playback::requests::RequestQueue;
use crate::playback::state::{CurrentTrack, InFlight, SessionShared, SessionState};
use crate::resolver::TrackResolver;
use crate::scratch::ScratchDir;
use crate::track::{RequestPriority, UpcomingEntry};
use crate::voice::{ChannelId, VoiceConnection, VoiceContext, VoiceGateway};
use futures::FutureExt;
use jukebot_common::events::{EventBus, PlaybackStatus, SessionEvent};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const STOPPED_MESSAGE: &str = "Playback stopped and queue cleared.";
pub const INACTIVITY_MESSAGE: &str = "No activity for 5 minutes. Disconnecting...";

/// What an enqueue added
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueSummary {
    pub added: usize,
    pub titles: Vec<String>,
    /// 1-based upcoming position of the first added entry
    pub first_position: Option<usize>,
}

impl EnqueueSummary {
    pub fn is_empty(&self) -> bool {
        self.added == 0
    }
}

/// Result of skipping the current track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipOutcome {
    Skipped,
    SkippedLast,
    NothingPlaying,
}

impl SkipOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            SkipOutcome::Skipped => "Track skipped.",
            SkipOutcome::SkippedLast => "Last track skipped. There are no more songs in the queue.",
            SkipOutcome::NothingPlaying => "There's nothing playing to skip.",
        }
    }
}

/// Point-in-time view of the session for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub status: PlaybackStatus,
    pub current: Option<CurrentTrack>,
    pub song_counter: u64,
    pub remaining: usize,
    pub upcoming: usize,
    pub ready: usize,
    pub channel: Option<ChannelId>,
    pub terminated: bool,
    pub download_worker_running: bool,
    pub player_worker_running: bool,
    pub download_worker_launches: u64,
    pub player_worker_launches: u64,
    pub inactivity_armed: bool,
}

/// External collaborators a session is built from
#[derive(Clone)]
pub struct SessionDeps {
    pub gateway: Arc<dyn VoiceGateway>,
    pub resolver: Arc<dyn TrackResolver>,
    pub sink: Arc<dyn OutputSink>,
    pub events: EventBus,
}

/// Worker lifecycle and pending command tasks
struct Control {
    token: CancellationToken,
    download: Option<JoinHandle<()>>,
    player: Option<JoinHandle<()>>,
    tasks: Vec<AbortHandle>,
    download_launches: u64,
    player_launches: u64,
}

impl Control {
    fn prune_tasks(&mut self) {
        self.tasks.retain(|t| !t.is_finished());
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn is_running(handle: &Option<JoinHandle<()>>) -> bool {
    handle.as_ref().is_some_and(|h| !h.is_finished())
}

struct SessionInner {
    id: Uuid,
    gateway: Arc<dyn VoiceGateway>,
    settings: SessionSettings,
    shared: Arc<SessionShared>,
    control: Mutex<Control>,
    /// Serializes connect/stop so a migration never races a teardown
    connection_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Build a session whose downloads live under `<scratch_root>/<session id>`
    pub fn new(deps: SessionDeps, settings: SessionSettings, scratch_root: &ScratchDir) -> Self {
        let id = Uuid::new_v4();
        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let on_fire = inactivity_callback(weak.clone());
            let shared = Arc::new(SessionShared {
                resolver: deps.resolver,
                sink: deps.sink,
                state: SessionState::new(deps.events.clone()),
                events: deps.events,
                queue: PlayQueue::new(),
                requests: RequestQueue::new(),
                in_flight: InFlight::default(),
                inactivity: InactivityTimer::new(settings.inactivity_timeout(), on_fire),
                scratch: scratch_root.child(&id.to_string()),
            });
            SessionInner {
                id,
                gateway: deps.gateway,
                settings,
                shared,
                control: Mutex::new(Control {
                    token: CancellationToken::new(),
                    download: None,
                    player: None,
                    tasks: Vec::new(),
                    download_launches: 0,
                    player_launches: 0,
                }),
                connection_lock: Mutex::new(()),
            }
        });
        info!(session_id = %id, "Session created");
        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.shared.events
    }

    /// Per-session download directory
    pub fn scratch(&self) -> &ScratchDir {
        &self.inner.shared.scratch
    }

    pub async fn is_terminated(&self) -> bool {
        self.inner.control.lock().await.token.is_cancelled()
    }

    /// Establish or migrate the voice connection.
    ///
    /// A migration connects to the new channel before leaving the old one,
    /// so a failed connect leaves the session untouched.
    pub async fn connect(&self, context: &VoiceContext) -> Result<Arc<dyn VoiceConnection>> {
        let channel = context.channel.clone().ok_or(Error::NotInVoice)?;
        let _guard = self.inner.connection_lock.lock().await;
        let state = &self.inner.shared.state;

        let existing = state.connection().await;
        if let Some(connection) = &existing {
            if connection.channel() == &channel && connection.is_connected() {
                return Ok(connection.clone());
            }
        }

        let connection = self
            .inner
            .gateway
            .connect(&channel)
            .await
            .map_err(|e| match e {
                Error::Connection(_) => e,
                other => Error::Connection(other.to_string()),
            })?;
        state.replace_connection(Some(connection.clone())).await;
        info!(%channel, user = %context.user, "Voice connection established");

        if let Some(old) = existing {
            debug!(channel = %old.channel(), "Leaving previous voice channel");
            old.disconnect().await;
        }
        Ok(connection)
    }

    /// Resolve a reference and queue every item it expands to.
    ///
    /// Runs as a tracked task: `stop()` aborts it, yielding an empty summary.
    pub async fn enqueue(
        &self,
        reference: &str,
        priority: RequestPriority,
    ) -> Result<EnqueueSummary> {
        let token = {
            let mut control = self.inner.control.lock().await;
            control.prune_tasks();
            control.token.clone()
        };
        if token.is_cancelled() {
            debug!(reference, "Enqueue rejected, session terminated");
            return Ok(EnqueueSummary::default());
        }
        self.inner.shared.inactivity.cancel().await;

        let shared = self.inner.shared.clone();
        let reference = reference.to_string();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            enqueue_items(&shared, &reference, priority, &task_token).await
        });
        self.inner
            .control
            .lock()
            .await
            .tasks
            .push(handle.abort_handle());

        let result = match handle.await {
            Ok(Err(Error::Terminated)) => Ok(EnqueueSummary::default()),
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(EnqueueSummary::default()),
            Err(e) => Err(Error::Internal(format!("enqueue task failed: {}", e))),
        };
        if !matches!(&result, Ok(summary) if summary.added > 0) {
            self.rearm_if_idle().await;
        }
        result
    }

    /// Arm the inactivity timer when nothing is playing or queued. Covers an
    /// enqueue that disarmed the timer and then queued nothing.
    async fn rearm_if_idle(&self) {
        let shared = &self.inner.shared;
        if self.is_terminated().await {
            return;
        }
        if shared.state.current().await.is_none() && shared.queue.upcoming_len().await == 0 {
            shared.inactivity.arm().await;
        }
    }

    /// Launch both workers if they are not running. Idempotent.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.inner.shared;
        let mut control = self.inner.control.lock().await;

        if control.token.is_cancelled() {
            control.token = CancellationToken::new();
            shared.queue.reopen().await;
            shared.requests.reopen().await;
            debug!(session_id = %self.inner.id, "Session reopened");
        }
        shared.scratch.ensure().await?;

        if !is_running(&control.download) {
            let worker = DownloadWorker::new(shared.clone(), control.token.clone());
            control.download = Some(worker.start());
            control.download_launches += 1;
        }
        if !is_running(&control.player) {
            let worker = PlayerWorker::new(shared.clone(), control.token.clone());
            control.player = Some(worker.start());
            control.player_launches += 1;
        }
        Ok(())
    }

    /// Jump to a 1-based upcoming position, dropping everything before it
    pub async fn skip_to_position(&self, position: usize) -> Result<String> {
        if self.is_terminated().await {
            return Err(Error::Terminated);
        }
        let shared = &self.inner.shared;

        // Prefix removal happens before the stop so the woken worker can
        // never pop a dropped entry
        let removed = shared.queue.skip_to(position).await?;
        if !removed.is_empty() {
            shared.requests.remove(&removed.ids).await;
            shared.in_flight.cancel_if(|id| removed.contains(id)).await;
            shared.events.emit_lossy(SessionEvent::QueueCleared {
                dropped: removed.len(),
                timestamp: chrono::Utc::now(),
            });
        }
        info!(position, dropped = removed.len(), "Skipping to position");
        removed.discard();

        self.stop_current().await;
        Ok(format!("Skipped to position {} in the queue.", position))
    }

    /// Stop the active track; the worker moves on to the next one
    pub async fn skip_current(&self) -> SkipOutcome {
        let shared = &self.inner.shared;
        let status = shared.state.status().await;
        let Some(connection) = shared.state.connection().await else {
            return SkipOutcome::NothingPlaying;
        };
        let active = connection.is_playing()
            || connection.is_paused()
            || matches!(status, PlaybackStatus::Playing | PlaybackStatus::Paused);
        if !active {
            return SkipOutcome::NothingPlaying;
        }

        let more = shared.queue.upcoming_len().await > 0;
        connection.stop().await;
        info!(more, "Track skipped");
        if more {
            SkipOutcome::Skipped
        } else {
            SkipOutcome::SkippedLast
        }
    }

    /// Drop every pending download and upcoming entry, keeping the current
    /// track playing. Returns how many entries were dropped.
    pub async fn clear_upcoming(&self) -> usize {
        let shared = &self.inner.shared;
        shared.requests.drain().await;
        let removed = shared.queue.clear().await;
        shared.in_flight.cancel_if(|id| removed.contains(id)).await;

        let dropped = removed.len();
        removed.discard();
        let remaining = usize::from(shared.state.current().await.is_some());
        shared.state.set_remaining(remaining);
        shared.events.emit_lossy(SessionEvent::QueueCleared {
            dropped,
            timestamp: chrono::Utc::now(),
        });
        info!(dropped, "Upcoming queue cleared");
        dropped
    }

    /// Pause the playing track; false when nothing is playing
    pub async fn pause(&self) -> bool {
        let state = &self.inner.shared.state;
        let Some(connection) = state.connection().await else {
            return false;
        };
        if !connection.is_playing() {
            return false;
        }
        connection.pause().await;
        state.set_status(PlaybackStatus::Paused).await;
        true
    }

    /// Resume a paused track; false when nothing is paused
    pub async fn resume(&self) -> bool {
        let state = &self.inner.shared.state;
        let Some(connection) = state.connection().await else {
            return false;
        };
        if !connection.is_paused() {
            return false;
        }
        connection.resume().await;
        state.set_status(PlaybackStatus::Playing).await;
        true
    }

    /// Toggle pause; returns the status after the toggle
    pub async fn toggle_pause(&self) -> PlaybackStatus {
        if self.inner.shared.state.status().await == PlaybackStatus::Paused {
            self.resume().await;
        } else {
            self.pause().await;
        }
        self.inner.shared.state.status().await
    }

    /// Terminate the session: stop workers, drop queued tracks, disconnect,
    /// reset state and purge the session scratch directory
    pub async fn stop(&self) {
        let shared = &self.inner.shared;
        let _guard = self.inner.connection_lock.lock().await;

        let (download, player) = {
            let mut control = self.inner.control.lock().await;
            control.token.cancel();
            control.abort_tasks();
            (control.download.take(), control.player.take())
        };
        shared.inactivity.cancel().await;

        shared.requests.close().await;
        let removed = shared.queue.close().await;
        let dropped = removed.len();
        removed.discard();

        if let Some(connection) = shared.state.replace_connection(None).await {
            connection.stop().await;
            connection.disconnect().await;
        }

        let grace = self.inner.settings.shutdown_grace();
        for (name, handle) in [("download", download), ("playback", player)] {
            let Some(mut handle) = handle else {
                continue;
            };
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("{} worker did not stop within {:?}, aborting", name, grace);
                handle.abort();
            }
        }

        shared.state.reset().await;
        if let Err(e) = shared.scratch.purge().await {
            warn!("Failed to purge session scratch directory: {}", e);
        }
        shared.events.emit_lossy(SessionEvent::SessionStopped {
            timestamp: chrono::Utc::now(),
        });
        info!(session_id = %self.inner.id, dropped, "Session stopped");
    }

    /// `stop()` plus the user-visible notice
    pub async fn cleanup(&self) {
        self.inner.shared.inactivity.cancel().await;
        self.inner.control.lock().await.abort_tasks();
        self.stop().await;
        self.inner.shared.sink.send(Notice::text(STOPPED_MESSAGE)).await;
    }

    pub async fn queue_view(&self) -> QueueView {
        let shared = &self.inner.shared;
        let current = shared.state.current().await;
        let mut upcoming: Vec<String> = shared
            .queue
            .peek_upcoming()
            .await
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}. {}", i + 1, entry.title))
            .collect();
        if upcoming.is_empty() {
            upcoming.push(EMPTY_QUEUE.to_string());
        }
        QueueView {
            now_playing: current
                .as_ref()
                .map(|c| c.title.clone())
                .unwrap_or_else(|| NO_CURRENT_SONG.to_string()),
            thumbnail: current.and_then(|c| c.thumbnail),
            upcoming,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let shared = &self.inner.shared;
        let (terminated, download_running, player_running, download_launches, player_launches) = {
            let control = self.inner.control.lock().await;
            (
                control.token.is_cancelled(),
                is_running(&control.download),
                is_running(&control.player),
                control.download_launches,
                control.player_launches,
            )
        };
        SessionSnapshot {
            session_id: self.inner.id,
            status: shared.state.status().await,
            current: shared.state.current().await,
            song_counter: shared.state.song_counter(),
            remaining: shared.state.remaining(),
            upcoming: shared.queue.upcoming_len().await,
            ready: shared.queue.ready_len().await,
            channel: shared
                .state
                .connection()
                .await
                .map(|c| c.channel().clone()),
            terminated,
            download_worker_running: download_running,
            player_worker_running: player_running,
            download_worker_launches: download_launches,
            player_worker_launches: player_launches,
            inactivity_armed: shared.inactivity.is_armed().await,
        }
    }

    async fn stop_current(&self) {
        if let Some(connection) = self.inner.shared.state.connection().await {
            if connection.is_playing() || connection.is_paused() {
                connection.stop().await;
            }
        }
    }
}

/// Inspect, then push entries and requests in one block
async fn enqueue_items(
    shared: &SessionShared,
    reference: &str,
    priority: RequestPriority,
    token: &CancellationToken,
) -> Result<EnqueueSummary> {
    let inspection = tokio::select! {
        inspection = shared.resolver.inspect(reference) => inspection?,
        _ = token.cancelled() => return Ok(EnqueueSummary::default()),
    };
    let items = inspection.into_items(reference)?;
    if token.is_cancelled() {
        return Ok(EnqueueSummary::default());
    }

    let entries: Vec<UpcomingEntry> = items
        .into_iter()
        .map(|item| UpcomingEntry::new(item.reference, item.title))
        .collect();
    let requests = entries.iter().map(|e| e.request(priority)).collect();
    let first_position = shared.queue.push_upcoming(entries.clone(), priority).await?;
    shared.requests.push_all(requests, priority).await;

    for (offset, entry) in entries.iter().enumerate() {
        shared.events.emit_lossy(SessionEvent::TrackQueued {
            track_id: entry.id,
            title: entry.title.clone(),
            position: first_position + offset,
            timestamp: chrono::Utc::now(),
        });
    }
    info!(reference, added = entries.len(), ?priority, "Queued tracks");

    Ok(EnqueueSummary {
        added: entries.len(),
        titles: entries.into_iter().map(|e| e.title).collect(),
        first_position: Some(first_position),
    })
}

fn inactivity_callback(session: Weak<SessionInner>) -> FireFn {
    Arc::new(move || {
        let session = session.clone();
        async move {
            let Some(inner) = session.upgrade() else {
                return;
            };
            let session = Session { inner };
            let shared = &session.inner.shared;
            if shared.state.status().await == PlaybackStatus::Playing {
                return;
            }
            let connected = shared
                .state
                .connection()
                .await
                .is_some_and(|c| c.is_connected());
            if !connected {
                return;
            }
            info!("Inactivity timeout, disconnecting");
            shared.sink.send(Notice::text(INACTIVITY_MESSAGE)).await;
            session.cleanup().await;
        }
        .boxed()
    })
}
