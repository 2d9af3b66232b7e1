//! Command and control-panel handlers
//!
//! Thin adapters from user input to `Session` methods. Every handler
//! acknowledges its interaction and reports errors to the invoking user only.

use crate::controls::actions::{parse_position, ControlAction, SKIP_TO_FORM};
use crate::controls::interaction::{Interaction, Reply, Responder};
use crate::error::{Error, Result};
use crate::output::Notice;
use crate::playback::session::{Session, STOPPED_MESSAGE};
use crate::track::RequestPriority;
use jukebot_common::events::PlaybackStatus;
use tracing::{debug, warn};

pub const CLEARED_MESSAGE: &str = "Upcoming queue cleared. Current song will continue playing.";
pub const LEFT_MESSAGE: &str = "Disconnected from the voice channel and cleared the queue.";
pub const LEFT_PANEL_MESSAGE: &str = "Disconnected from the voice channel.";
pub const PLAY_NEXT_MESSAGE: &str = "Your song will play next!";
pub const NOTHING_QUEUED_MESSAGE: &str = "Nothing was added to the queue.";

/// Slash-style commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play { reference: String },
    PlayNext { reference: String },
    Stop,
    Skip,
    Leave,
    Queue,
    ClearQueue,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play { .. } => "play",
            Command::PlayNext { .. } => "play_next",
            Command::Stop => "stop",
            Command::Skip => "skip",
            Command::Leave => "leave",
            Command::Queue => "queue",
            Command::ClearQueue => "clear_queue",
        }
    }

    /// Commands that may outlive the immediate-response window defer first.
    /// Returns the deferral's visibility.
    fn deferral(&self) -> Option<bool> {
        match self {
            Command::Play { .. } | Command::PlayNext { .. } => Some(true),
            Command::Stop | Command::Leave | Command::Queue => Some(false),
            Command::Skip | Command::ClearQueue => None,
        }
    }
}

/// Text shown to the user for a failed command
pub fn error_message(e: &Error) -> String {
    match e {
        Error::NotInVoice
        | Error::Connection(_)
        | Error::InvalidPosition(_)
        | Error::InvalidInput(_)
        | Error::Resolve { .. } => e.to_string(),
        Error::Unsupported(message) => message.clone(),
        _ => format!("An error occurred: {}", e),
    }
}

/// Run a command; any failure is reported back to the invoking user
pub async fn run_command<R: Responder>(
    session: &Session,
    interaction: &Interaction<R>,
    command: Command,
) -> Result<()> {
    let name = command.name();
    if let Some(ephemeral) = command.deferral() {
        interaction.defer(ephemeral).await?;
    }
    if let Err(e) = dispatch_command(session, interaction, command).await {
        warn!(command = name, user = %interaction.context().user, "Command failed: {}", e);
        interaction.reply(Reply::error(error_message(&e))).await?;
    }
    Ok(())
}

async fn dispatch_command<R: Responder>(
    session: &Session,
    interaction: &Interaction<R>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Play { reference } => play(session, interaction, &reference).await,
        Command::PlayNext { reference } => play_next(session, interaction, &reference).await,
        Command::Stop => {
            session.stop().await;
            interaction.reply(Reply::text(STOPPED_MESSAGE, false)).await
        }
        Command::Skip => {
            let outcome = session.skip_current().await;
            interaction.reply(Reply::text(outcome.message(), false)).await
        }
        Command::Leave => {
            session.cleanup().await;
            interaction.reply(Reply::text(LEFT_MESSAGE, false)).await
        }
        Command::Queue => {
            let view = session.queue_view().await;
            interaction
                .reply(Reply::Message {
                    notice: Notice::Queue { view },
                    ephemeral: false,
                })
                .await
        }
        Command::ClearQueue => {
            session.clear_upcoming().await;
            interaction.reply(Reply::text(CLEARED_MESSAGE, false)).await
        }
    }
}

async fn play<R: Responder>(
    session: &Session,
    interaction: &Interaction<R>,
    reference: &str,
) -> Result<()> {
    session.connect(interaction.context()).await?;
    session.start().await?;
    let summary = session.enqueue(reference, RequestPriority::Append).await?;
    let message = match summary.added {
        0 => {
            debug!(reference, "Nothing queued");
            NOTHING_QUEUED_MESSAGE.to_string()
        }
        1 => "Added 1 track to the queue. This may take a moment.".to_string(),
        n => format!(
            "Adding {} tracks to the queue. This may take a moment for the queue to load.",
            n
        ),
    };
    interaction.reply(Reply::text(message, true)).await
}

async fn play_next<R: Responder>(
    session: &Session,
    interaction: &Interaction<R>,
    reference: &str,
) -> Result<()> {
    session.connect(interaction.context()).await?;
    session.start().await?;
    let summary = session.enqueue(reference, RequestPriority::PlayNext).await?;
    let message = if summary.is_empty() {
        debug!(reference, "Nothing queued");
        NOTHING_QUEUED_MESSAGE
    } else {
        PLAY_NEXT_MESSAGE
    };
    interaction.reply(Reply::text(message, true)).await
}

/// Run a control-panel button; replies are ephemeral
pub async fn run_action<R: Responder>(
    session: &Session,
    interaction: &Interaction<R>,
    action: ControlAction,
) -> Result<()> {
    if let Err(e) = dispatch_action(session, interaction, action).await {
        warn!(action = action.custom_id(), "Control action failed: {}", e);
        interaction.reply(Reply::error(error_message(&e))).await?;
    }
    Ok(())
}

async fn dispatch_action<R: Responder>(
    session: &Session,
    interaction: &Interaction<R>,
    action: ControlAction,
) -> Result<()> {
    let reply = match action {
        ControlAction::PlayPause => match session.toggle_pause().await {
            PlaybackStatus::Paused => Reply::text("Music paused.", true),
            _ => Reply::text("Music resumed.", true),
        },
        ControlAction::Skip => Reply::text(session.skip_current().await.message(), true),
        ControlAction::Leave => {
            session.cleanup().await;
            Reply::text(LEFT_PANEL_MESSAGE, true)
        }
        ControlAction::ClearQueue => {
            session.clear_upcoming().await;
            Reply::text(CLEARED_MESSAGE, true)
        }
        ControlAction::ViewQueue => Reply::Message {
            notice: Notice::Queue {
                view: session.queue_view().await,
            },
            ephemeral: true,
        },
        ControlAction::SkipTo => Reply::Form { form: SKIP_TO_FORM },
    };
    interaction.reply(reply).await
}

/// Handle the Skip To form submission
pub async fn submit_skip_to<R: Responder>(
    session: &Session,
    interaction: &Interaction<R>,
    raw: &str,
) -> Result<()> {
    let result = match parse_position(raw) {
        Ok(position) => session.skip_to_position(position).await,
        Err(e) => Err(e),
    };
    let reply = match result {
        Ok(message) => Reply::text(message, true),
        Err(e) => Reply::error(error_message(&e)),
    };
    interaction.reply(reply).await
}
