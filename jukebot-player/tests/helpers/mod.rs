//! Test doubles for session integration tests
//!
//! - FakeResolver: scripted inspect/fetch with per-reference delays, failures
//!   and interrupted fetches
//! - FakeGateway / FakeConnection: in-memory voice output with manual or timed
//!   completion, recording every bind
//! - RecordingSink: collects notices
//! - Harness: a session wired to the fakes over a temp scratch root

#![allow(dead_code)]

use async_trait::async_trait;
use jukebot_common::events::EventBus;
use jukebot_player::config::SessionSettings;
use jukebot_player::output::{Notice, OutputSink};
use jukebot_player::playback::{EnqueueSummary, Session, SessionDeps};
use jukebot_player::resolver::{Inspection, PlaylistEntry, TrackResolver};
use jukebot_player::scratch::ScratchDir;
use jukebot_player::track::{RequestPriority, ResolvedTrack, TrackId};
use jukebot_player::voice::{
    ChannelId, CompletionSignal, PlaybackOutcome, VoiceConnection, VoiceContext, VoiceGateway,
};
use jukebot_player::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const PLAYLIST_PREFIX: &str = "playlist:";

// ============================================================================
// Resolver
// ============================================================================

/// Resolver that never touches the network.
///
/// `playlist:a,b,c` inspects as a playlist of `a`, `b`, `c`; anything else is
/// a single item titled by its reference. Fetch writes `<id>.part`, waits the
/// configured delay, then renames it to `<id>.mp3`.
#[derive(Default)]
pub struct FakeResolver {
    default_delay: Mutex<Duration>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    unresolvable: Mutex<HashSet<String>>,
    interrupted: Mutex<HashSet<String>>,
    inspect_delay: Mutex<Duration>,
    fetched: Mutex<Vec<String>>,
    cancelled: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default_delay(&self, delay: Duration) {
        *self.default_delay.lock().unwrap() = delay;
    }

    pub fn set_delay(&self, reference: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(reference.to_string(), delay);
    }

    pub fn fail(&self, reference: &str) {
        self.failing.lock().unwrap().insert(reference.to_string());
    }

    /// Make `inspect` fail for `reference`
    pub fn fail_inspect(&self, reference: &str) {
        self.unresolvable
            .lock()
            .unwrap()
            .insert(reference.to_string());
    }

    /// Make `fetch` for `reference` end as cancelled without its token firing
    pub fn interrupt(&self, reference: &str) {
        self.interrupted
            .lock()
            .unwrap()
            .insert(reference.to_string());
    }

    pub fn set_inspect_delay(&self, delay: Duration) {
        *self.inspect_delay.lock().unwrap() = delay;
    }

    /// References whose fetch started, in order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn delay_for(&self, reference: &str) -> Duration {
        self.delays
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .unwrap_or(*self.default_delay.lock().unwrap())
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn inspect(&self, reference: &str) -> Result<Inspection> {
        let delay = *self.inspect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.unresolvable.lock().unwrap().contains(reference) {
            return Err(Error::Resolve {
                reference: reference.to_string(),
                message: "unsupported URL".to_string(),
            });
        }
        if let Some(list) = reference.strip_prefix(PLAYLIST_PREFIX) {
            let entries = list
                .split(',')
                .filter(|r| !r.is_empty())
                .map(|r| PlaylistEntry {
                    reference: r.to_string(),
                    title: r.to_string(),
                })
                .collect();
            return Ok(Inspection::Playlist { entries });
        }
        Ok(Inspection::Single {
            title: reference.to_string(),
        })
    }

    async fn fetch(
        &self,
        id: TrackId,
        reference: &str,
        dest: &ScratchDir,
        cancel: CancellationToken,
    ) -> Result<ResolvedTrack> {
        self.fetched.lock().unwrap().push(reference.to_string());
        let part = dest.path().join(format!("{}.part", id));
        tokio::fs::write(&part, b"partial").await?;

        if self.interrupted.lock().unwrap().contains(reference) {
            dest.remove_by_id(id).await;
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Cancelled);
        }

        let delay = self.delay_for(reference);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                dest.remove_by_id(id).await;
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                return Err(Error::Cancelled);
            }
        }

        if self.failing.lock().unwrap().contains(reference) {
            dest.remove_by_id(id).await;
            return Err(Error::Resolve {
                reference: reference.to_string(),
                message: "video unavailable".to_string(),
            });
        }

        let path = dest.path().join(format!("{}.mp3", id));
        tokio::fs::rename(&part, &path).await?;
        Ok(ResolvedTrack::new(
            id,
            path,
            reference,
            Some(format!("https://img.example/{}.jpg", reference)),
        ))
    }
}

// ============================================================================
// Voice
// ============================================================================

#[derive(Default)]
struct ConnState {
    current: Option<(u64, CompletionSignal)>,
    paused: bool,
    connected: bool,
    next_bind: u64,
    bound: Vec<PathBuf>,
    missing_files: usize,
    overlapping_binds: usize,
}

/// In-memory voice connection. With `auto_finish` set, every bound track
/// finishes by itself after that long; otherwise call [`FakeConnection::finish`].
pub struct FakeConnection {
    channel: ChannelId,
    auto_finish: Option<Duration>,
    state: Arc<Mutex<ConnState>>,
}

impl FakeConnection {
    fn new(channel: ChannelId, auto_finish: Option<Duration>) -> Self {
        Self {
            channel,
            auto_finish,
            state: Arc::new(Mutex::new(ConnState {
                connected: true,
                ..ConnState::default()
            })),
        }
    }

    /// Finish the bound track normally; false when nothing is bound
    pub fn finish(&self) -> bool {
        self.complete(PlaybackOutcome::Finished)
    }

    /// Simulate a stream error on the bound track
    pub fn fail_stream(&self) -> bool {
        self.complete(PlaybackOutcome::Failed("stream error".to_string()))
    }

    fn complete(&self, outcome: PlaybackOutcome) -> bool {
        let taken = {
            let mut state = self.state.lock().unwrap();
            state.paused = false;
            state.current.take()
        };
        match taken {
            Some((_, signal)) => {
                signal.complete(outcome);
                true
            }
            None => false,
        }
    }

    pub fn bound(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().bound.clone()
    }

    pub fn bind_count(&self) -> usize {
        self.state.lock().unwrap().bound.len()
    }

    /// Binds whose file did not exist at bind time
    pub fn missing_files(&self) -> usize {
        self.state.lock().unwrap().missing_files
    }

    /// Binds attempted while another track was still bound
    pub fn overlapping_binds(&self) -> usize {
        self.state.lock().unwrap().overlapping_binds
    }

    pub fn has_track(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel(&self) -> &ChannelId {
        &self.channel
    }

    async fn play(&self, path: &Path, done: CompletionSignal) -> Result<()> {
        let bind = {
            let mut state = self.state.lock().unwrap();
            if state.current.is_some() {
                state.overlapping_binds += 1;
                return Err(Error::Playback("already playing".to_string()));
            }
            if !path.exists() {
                state.missing_files += 1;
            }
            state.next_bind += 1;
            let bind = state.next_bind;
            state.bound.push(path.to_path_buf());
            state.current = Some((bind, done));
            state.paused = false;
            bind
        };

        if let Some(after) = self.auto_finish {
            let state = self.state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let signal = {
                    let mut state = state.lock().unwrap();
                    match &state.current {
                        Some((current, _)) if *current == bind => state.current.take(),
                        _ => None,
                    }
                };
                if let Some((_, signal)) = signal {
                    signal.complete(PlaybackOutcome::Finished);
                }
            });
        }
        Ok(())
    }

    async fn stop(&self) {
        self.complete(PlaybackOutcome::Stopped);
    }

    async fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        if state.current.is_some() {
            state.paused = true;
        }
    }

    async fn resume(&self) {
        self.state.lock().unwrap().paused = false;
    }

    fn is_playing(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.current.is_some() && !state.paused
    }

    fn is_paused(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.current.is_some() && state.paused
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn disconnect(&self) {
        self.complete(PlaybackOutcome::Stopped);
        self.state.lock().unwrap().connected = false;
    }
}

#[derive(Default)]
pub struct FakeGateway {
    auto_finish: Mutex<Option<Duration>>,
    refused: Mutex<HashSet<String>>,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_auto_finish(&self, after: Option<Duration>) {
        *self.auto_finish.lock().unwrap() = after;
    }

    pub fn refuse(&self, channel: &str) {
        self.refused.lock().unwrap().insert(channel.to_string());
    }

    pub fn connections(&self) -> Vec<Arc<FakeConnection>> {
        self.connections.lock().unwrap().clone()
    }

    /// Most recent connection
    pub fn latest(&self) -> Option<Arc<FakeConnection>> {
        self.connections.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(&self, channel: &ChannelId) -> Result<Arc<dyn VoiceConnection>> {
        if self.refused.lock().unwrap().contains(&channel.0) {
            return Err(Error::Connection(format!("refused {}", channel)));
        }
        let auto_finish = *self.auto_finish.lock().unwrap();
        let connection = Arc::new(FakeConnection::new(channel.clone(), auto_finish));
        self.connections.lock().unwrap().push(connection.clone());
        Ok(connection)
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    /// Titles from "now playing" notices, in order
    pub fn now_playing(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::NowPlaying { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Text { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Error { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn send(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub const CHANNEL: &str = "general";

pub struct Harness {
    pub session: Session,
    pub resolver: Arc<FakeResolver>,
    pub gateway: Arc<FakeGateway>,
    pub sink: Arc<RecordingSink>,
    pub events: EventBus,
    _root: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: SessionSettings) -> Self {
        let root = TempDir::new().expect("temp dir");
        let resolver = Arc::new(FakeResolver::new());
        let gateway = Arc::new(FakeGateway::new());
        let sink = Arc::new(RecordingSink::default());
        let events = EventBus::new(64);
        let deps = SessionDeps {
            gateway: gateway.clone(),
            resolver: resolver.clone(),
            sink: sink.clone(),
            events: events.clone(),
        };
        let session = Session::new(deps, settings, &ScratchDir::new(root.path()));
        Self {
            session,
            resolver,
            gateway,
            sink,
            events,
            _root: root,
        }
    }

    pub fn context(&self) -> VoiceContext {
        user_in(CHANNEL)
    }

    /// Connect, start the workers and queue `reference`, like the play command
    pub async fn play(&self, reference: &str) -> EnqueueSummary {
        self.queue(reference, RequestPriority::Append).await
    }

    pub async fn play_next(&self, reference: &str) -> EnqueueSummary {
        self.queue(reference, RequestPriority::PlayNext).await
    }

    async fn queue(&self, reference: &str, priority: RequestPriority) -> EnqueueSummary {
        self.session.connect(&self.context()).await.expect("connect");
        self.session.start().await.expect("start");
        self.session
            .enqueue(reference, priority)
            .await
            .expect("enqueue")
    }

    pub fn connection(&self) -> Arc<FakeConnection> {
        self.gateway.latest().expect("no voice connection yet")
    }

    pub async fn scratch_files(&self) -> Vec<PathBuf> {
        self.session.scratch().files().await
    }

    /// Titles still waiting, as displayed by the queue view
    pub async fn upcoming(&self) -> Vec<String> {
        let view = self.session.queue_view().await;
        view.upcoming
    }

    pub async fn wait_for_bind_count(&self, count: usize) {
        let gateway = self.gateway.clone();
        let reached = wait_until(Duration::from_secs(5), || {
            let gateway = gateway.clone();
            async move {
                gateway
                    .latest()
                    .map(|c| c.bind_count() >= count)
                    .unwrap_or(false)
            }
        })
        .await;
        assert!(reached, "timed out waiting for {} binds", count);
    }

    /// Wait until a track is bound and finish it
    pub async fn finish_current(&self) {
        let gateway = self.gateway.clone();
        let bound = wait_until(Duration::from_secs(5), || {
            let gateway = gateway.clone();
            async move { gateway.latest().map(|c| c.has_track()).unwrap_or(false) }
        })
        .await;
        assert!(bound, "timed out waiting for a bound track");
        self.connection().finish();
    }
}

pub fn user_in(channel: &str) -> VoiceContext {
    VoiceContext {
        user: "tester".to_string(),
        channel: Some(ChannelId::new(channel)),
    }
}

/// Short timeouts so lifecycle tests finish quickly
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        inactivity_timeout_secs: 300,
        shutdown_grace_ms: 1000,
        event_capacity: 64,
    }
}

/// Poll `check` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
