//! Status line and headline derivation.
//!
//! Pure functions of the session state so they can be tested without a
//! terminal.

use cosmo_voice::{ConnectionState, Transcript};

/// Headline shown while idle.
pub const IDLE_PROMPT: &str = "Tap the orb and ask about the cosmos";

/// Headline shown in a session before anything has been said.
pub const EMPTY_SESSION_PROMPT: &str = "Tell me about Neutron Stars.";

/// Visual state of the start/stop control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbState {
    Idle,
    Listening,
    Speaking,
}

impl OrbState {
    /// Glyph shown before the status line.
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Idle => "○",
            Self::Listening => "◎",
            Self::Speaking => "●",
        }
    }
}

/// Microphone open and no reply audible.
pub fn is_listening(state: ConnectionState, speaking: bool) -> bool {
    state == ConnectionState::Connected && !speaking
}

pub fn orb_state(state: ConnectionState, speaking: bool) -> OrbState {
    if speaking {
        OrbState::Speaking
    } else if state == ConnectionState::Connecting || is_listening(state, speaking) {
        OrbState::Listening
    } else {
        OrbState::Idle
    }
}

/// Status line text; empty when idle.
pub fn status_text(state: ConnectionState, speaking: bool) -> &'static str {
    if state == ConnectionState::Connecting {
        "Connecting..."
    } else if is_listening(state, speaking) {
        "Listening..."
    } else if speaking {
        "Speaking..."
    } else if state == ConnectionState::Disconnecting {
        "Disconnecting..."
    } else {
        ""
    }
}

/// The headline: a prompt when idle, otherwise the latest non-blank turn.
pub fn display_text(state: ConnectionState, transcript: &Transcript) -> &str {
    if state == ConnectionState::Idle {
        return IDLE_PROMPT;
    }
    transcript
        .last_spoken()
        .map_or(EMPTY_SESSION_PROMPT, |turn| turn.text.as_str())
}
