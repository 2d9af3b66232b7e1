//! Control panel actions
//!
//! The panel attached to every "now playing" notice. Each button is an enum
//! variant with a static description; dispatch is a plain `match`.

use crate::error::{Error, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    PlayPause,
    Skip,
    Leave,
    ClearQueue,
    ViewQueue,
    SkipTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
}

/// Static description of one control button
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActionSpec {
    pub action: ControlAction,
    pub custom_id: &'static str,
    pub label: &'static str,
    pub emoji: &'static str,
    pub style: ButtonStyle,
}

pub const CONTROL_PANEL: [ActionSpec; 6] = [
    ActionSpec {
        action: ControlAction::PlayPause,
        custom_id: "play_pause",
        label: "Play/Pause",
        emoji: "⏯️",
        style: ButtonStyle::Primary,
    },
    ActionSpec {
        action: ControlAction::Skip,
        custom_id: "skip",
        label: "Skip",
        emoji: "⏭️",
        style: ButtonStyle::Primary,
    },
    ActionSpec {
        action: ControlAction::Leave,
        custom_id: "leave",
        label: "Leave",
        emoji: "🚪",
        style: ButtonStyle::Danger,
    },
    ActionSpec {
        action: ControlAction::ClearQueue,
        custom_id: "clear_queue",
        label: "Clear Queue",
        emoji: "🗑️",
        style: ButtonStyle::Danger,
    },
    ActionSpec {
        action: ControlAction::ViewQueue,
        custom_id: "view_queue",
        label: "View Queue",
        emoji: "📜",
        style: ButtonStyle::Secondary,
    },
    ActionSpec {
        action: ControlAction::SkipTo,
        custom_id: "skip_to",
        label: "Skip To",
        emoji: "⏩",
        style: ButtonStyle::Primary,
    },
];

impl ControlAction {
    pub fn spec(&self) -> &'static ActionSpec {
        let index = match self {
            ControlAction::PlayPause => 0,
            ControlAction::Skip => 1,
            ControlAction::Leave => 2,
            ControlAction::ClearQueue => 3,
            ControlAction::ViewQueue => 4,
            ControlAction::SkipTo => 5,
        };
        &CONTROL_PANEL[index]
    }

    pub fn custom_id(&self) -> &'static str {
        self.spec().custom_id
    }

    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        CONTROL_PANEL
            .iter()
            .find(|spec| spec.custom_id == custom_id)
            .map(|spec| spec.action)
    }
}

/// Position-input form opened by the Skip To button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormSpec {
    pub custom_id: &'static str,
    pub title: &'static str,
    pub label: &'static str,
    pub placeholder: &'static str,
}

pub const SKIP_TO_FORM: FormSpec = FormSpec {
    custom_id: "skip_to_position",
    title: "Skip To Position",
    label: "Queue Position",
    placeholder: "Enter a number",
};

/// Parse the raw form text into a queue position
pub fn parse_position(raw: &str) -> Result<usize> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput("Please enter a valid number.".to_string()))?;
    usize::try_from(value)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or(Error::InvalidPosition(0))
}
