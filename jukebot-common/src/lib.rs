//! # Jukebot Common Library
//!
//! Shared code for the jukebot workspace:
//! - Error type shared by configuration helpers
//! - Configuration file and scratch directory resolution
//! - Session event types (`SessionEvent`) and the `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PlaybackStatus, SessionEvent};
