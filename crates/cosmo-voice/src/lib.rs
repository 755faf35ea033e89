//! Realtime voice conversations with Cosmo.
//!
//! A [`VoiceSession`] captures the microphone, streams it to a realtime
//! speech model over a WebSocket, plays the spoken reply back without gaps
//! and keeps a running [`Transcript`] of both sides.
//!
//! Hardware and network sit behind traits ([`AudioDevices`],
//! [`RealtimeTransport`]) so the state machine runs unchanged against the
//! local cpal/rodio backend or against test doubles.
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tokio_test as _;

pub mod audio_io;
pub mod audio_local;
pub mod audio_thread;
pub mod capture;
pub mod capture_pipeline;
pub mod codec;
pub mod config;
pub mod error;
pub mod playback;
pub mod realtime;
pub mod scheduler;
pub mod session;
pub mod transcript;

// Re-export key types for convenience
pub use audio_io::{AudioDevices, AudioPair, AudioSink, AudioSource, CapturedChunk};
pub use audio_local::LocalAudioDevices;
pub use capture::{AudioDeviceInfo, list_input_devices};
pub use capture_pipeline::CaptureConfig;
pub use codec::{AudioBuffer, MediaBlob};
pub use config::SessionConfig;
pub use error::{ErrorKind, VoiceError};
pub use playback::list_output_devices;
pub use realtime::gemini::GeminiLiveTransport;
pub use realtime::{LiveConfig, Modality, Outbound, RealtimeLink, RealtimeTransport, ServerEvent};
pub use scheduler::{PlaybackId, PlaybackScheduler};
pub use session::{ConnectionState, SessionCommand, SessionEvent, VoiceSession};
pub use transcript::{ConversationTurn, Speaker, Transcript};
