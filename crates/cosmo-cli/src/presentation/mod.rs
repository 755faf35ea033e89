//! Terminal presentation for the voice session.
//!
//! Keep this module format-only: session semantics live in `cosmo-voice`.

pub mod status;
pub mod tables;
pub mod transcript;

pub use status::{OrbState, display_text, orb_state, status_text};
pub use tables::{format_optional, print_separator, truncate_string};
pub use transcript::{TranscriptPrinter, speaker_label};
