//! `AudioSource`, `AudioSink` and `AudioDevices`: the seams between the
//! voice session and the audio hardware.
//!
//! These traits decouple the [`VoiceSession`](crate::session::VoiceSession)
//! from any specific audio backend:
//!
//! | Implementor | Where used |
//! |---|---|
//! | [`LocalAudioDevices`](crate::audio_local::LocalAudioDevices) | CLI: cpal capture + rodio playback on the local machine |
//! | test doubles | `tests/session_state_machine.rs`: manual clock, no hardware |
//!
//! Source and sink are **object-safe** (`Box<dyn AudioSource>` /
//! `Box<dyn AudioSink>`). All methods take `&self`; implementations use
//! interior mutability (channels, atomics, mutexes).

use tokio::sync::mpsc;

use crate::codec::AudioBuffer;
use crate::error::VoiceError;
use crate::scheduler::PlaybackId;

/// A block of mono microphone samples as delivered by the device callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedChunk {
    /// Mono samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,

    /// Device sample rate of `samples`.
    pub sample_rate: u32,
}

/// Channel on which captured chunks are delivered. Sending never blocks.
pub type ChunkSender = mpsc::UnboundedSender<CapturedChunk>;

/// Channel on which naturally finished playback is reported.
pub type PlaybackEndedSender = mpsc::UnboundedSender<PlaybackId>;

// ── AudioSource ────────────────────────────────────────────────────

/// An acquired microphone.
///
/// Acquisition happens when the source is created; capture only flows once
/// [`start_capture`](AudioSource::start_capture) arms it. Dropping the
/// source releases the device.
pub trait AudioSource: Send + Sync {
    /// Begin delivering captured chunks to `chunks`.
    fn start_capture(&self, chunks: ChunkSender) -> Result<(), VoiceError>;

    /// Stop delivering chunks. Safe to call when not capturing.
    fn stop_capture(&self);

    /// Whether chunks are currently being delivered.
    fn is_capturing(&self) -> bool;
}

// ── AudioSink ──────────────────────────────────────────────────────

/// An output device with a monotonic clock and buffer scheduling.
///
/// Buffers that play to the end are reported on the
/// [`PlaybackEndedSender`] given to [`AudioDevices::open`]. Buffers removed
/// through [`stop`](AudioSink::stop) or [`stop_all`](AudioSink::stop_all)
/// are not reported.
pub trait AudioSink: Send + Sync {
    /// Current position of the output clock, in seconds.
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at `start_at` on the output clock.
    fn schedule(&self, id: PlaybackId, buffer: AudioBuffer, start_at: f64)
    -> Result<(), VoiceError>;

    /// Stop one scheduled buffer immediately.
    fn stop(&self, id: PlaybackId);

    /// Stop every scheduled buffer immediately.
    fn stop_all(&self);
}

// ── AudioDevices ───────────────────────────────────────────────────

/// A matched microphone / speaker pair for one session.
pub struct AudioPair {
    /// Microphone side.
    pub source: Box<dyn AudioSource>,

    /// Speaker side.
    pub sink: Box<dyn AudioSink>,
}

/// Factory for per-session audio resources.
///
/// Each call to [`open`](AudioDevices::open) acquires a fresh pair; the
/// session drops it on teardown.
pub trait AudioDevices: Send + Sync {
    /// Acquire the microphone and the output device.
    ///
    /// Microphone failures map to [`VoiceError::NoInputDevice`] or
    /// [`VoiceError::MicrophoneUnavailable`].
    fn open(&self, ended: PlaybackEndedSender) -> Result<AudioPair, VoiceError>;
}
