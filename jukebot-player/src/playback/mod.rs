//! Playback pipeline
//!
//! Download worker -> play queue -> playback worker, supervised by the
//! session controller.

pub mod download_worker;
pub mod inactivity;
pub mod player_worker;
pub mod queue;
pub mod requests;
pub mod session;
pub mod state;

pub use queue::{PlayQueue, Pop, Removed};
pub use session::{EnqueueSummary, Session, SessionDeps, SessionSnapshot, SkipOutcome};
pub use state::CurrentTrack;
