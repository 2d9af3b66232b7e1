//! Error types for jukebot-player
//!
//! One enum covers the whole playback pipeline. Resolution and cancellation
//! errors stay per-item; validation and connection errors go back to the
//! invoking command only.

use thiserror::Error;

/// Main error type for jukebot-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or extraction failure for one reference
    #[error("Error downloading {reference}: {message}")]
    Resolve { reference: String, message: String },

    /// Fetch was cancelled; partial files already removed
    #[error("Download cancelled")]
    Cancelled,

    /// Reference cannot be played (empty input, empty playlist, no output file)
    #[error("Unsupported reference: {0}")]
    Unsupported(String),

    /// Output binding or stream failure
    #[error("An error occurred during playback: {0}")]
    Playback(String),

    /// Skip-to position outside the upcoming list
    #[error("Invalid position. Please provide a valid queue position.")]
    InvalidPosition(usize),

    /// Malformed user input
    #[error("{0}")]
    InvalidInput(String),

    /// Invoking user is not in a voice channel
    #[error("You need to be in a voice channel to use this command.")]
    NotInVoice,

    /// Voice connection could not be established
    #[error("Failed to connect to the voice channel.")]
    Connection(String),

    /// Mutation attempted after the termination signal was set
    #[error("Session is shutting down")]
    Terminated,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] jukebot_common::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using jukebot-player Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn resolve(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Resolve {
            reference: reference.into(),
            message: message.into(),
        }
    }
}
