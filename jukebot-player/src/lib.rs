//! # jukebot-player
//!
//! Queue-driven audio playback controller.
//!
//! Users submit references (single tracks or playlists). A download worker
//! resolves them into local audio files in the background while a player
//! worker plays ready tracks one at a time through a voice connection, in
//! request order. A [`Session`] ties the two workers to one voice connection
//! and exposes the transport operations (skip, skip-to, pause, clear, stop).
//!
//! **Architecture:** tokio tasks around a lock-guarded [`playback::PlayQueue`];
//! yt-dlp as the resolver; symphonia + rubato + cpal as the local output.

pub mod api;
pub mod audio;
pub mod config;
pub mod controls;
pub mod error;
pub mod output;
pub mod playback;
pub mod resolver;
pub mod scratch;
pub mod track;
pub mod voice;

pub use error::{Error, Result};
pub use playback::Session;
