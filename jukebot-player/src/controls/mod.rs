//! Transport controls: commands, control-panel actions and interaction
//! acknowledgement

pub mod actions;
pub mod commands;
pub mod interaction;

pub use actions::{ControlAction, CONTROL_PANEL};
pub use commands::{run_action, run_command, submit_skip_to, Command};
pub use interaction::{Interaction, RecordingResponder, Reply, Responder};
