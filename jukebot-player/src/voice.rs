//! Voice gateway abstraction
//!
//! A gateway opens connections to channels; a connection plays one local file
//! at a time and reports the end of playback through a [`CompletionSignal`].

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Identifier of a voice channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who issued a command and which voice channel they are in, if any
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceContext {
    pub user: String,
    #[serde(default)]
    pub channel: Option<ChannelId>,
}

/// How a bound track stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Reached end of stream
    Finished,
    /// Stopped by `stop()` or disconnect
    Stopped,
    /// Output reported a stream error
    Failed(String),
}

/// One-shot end-of-playback notification, safe to fire from any thread
#[derive(Debug)]
pub struct CompletionSignal(oneshot::Sender<PlaybackOutcome>);

impl CompletionSignal {
    pub fn complete(self, outcome: PlaybackOutcome) {
        // Receiver gone means the worker already stopped waiting
        let _ = self.0.send(outcome);
    }
}

/// Receiving half awaited by the playback worker
pub type CompletionReceiver = oneshot::Receiver<PlaybackOutcome>;

pub fn completion_pair() -> (CompletionSignal, CompletionReceiver) {
    let (tx, rx) = oneshot::channel();
    (CompletionSignal(tx), rx)
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(&self, channel: &ChannelId) -> Result<Arc<dyn VoiceConnection>>;
}

/// A live voice connection bound to one channel
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel(&self) -> &ChannelId;

    /// Start playing a local file. `done` must fire exactly once when
    /// playback ends for any reason.
    async fn play(&self, path: &Path, done: CompletionSignal) -> Result<()>;

    /// Stop the current file; fires its completion with `Stopped`
    async fn stop(&self);

    async fn pause(&self);

    async fn resume(&self);

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Stop anything playing and leave the channel
    async fn disconnect(&self);
}
