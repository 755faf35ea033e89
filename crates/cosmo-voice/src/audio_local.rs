//! Local (cpal/rodio) adapters for the [`AudioSource`], [`AudioSink`] and
//! [`AudioDevices`] traits.
//!
//! [`LocalAudioSource`] wraps the [`AudioThreadHandle`]; [`LocalAudioSink`]
//! wraps the [`MixerHandle`] and keeps the thread handle alive too, so the
//! output stream outlives every scheduled buffer. The audio OS thread is
//! joined when the last of the pair is dropped.

use std::sync::Arc;

use crate::audio_io::{
    AudioDevices, AudioPair, AudioSink, AudioSource, ChunkSender, PlaybackEndedSender,
};
use crate::audio_thread::AudioThreadHandle;
use crate::codec::AudioBuffer;
use crate::error::VoiceError;
use crate::playback::{MixerHandle, PLAYBACK_SAMPLE_RATE};
use crate::scheduler::PlaybackId;

// ── LocalAudioSource ───────────────────────────────────────────────

/// Local microphone adapter: delegates to cpal via [`AudioThreadHandle`].
pub struct LocalAudioSource {
    handle: Arc<AudioThreadHandle>,
}

impl AudioSource for LocalAudioSource {
    fn start_capture(&self, chunks: ChunkSender) -> Result<(), VoiceError> {
        self.handle.start_capture(chunks)
    }

    fn stop_capture(&self) {
        self.handle.stop_capture();
    }

    fn is_capturing(&self) -> bool {
        self.handle.is_capturing()
    }
}

// ── LocalAudioSink ─────────────────────────────────────────────────

/// Local speaker adapter: schedules onto the rodio mixer.
pub struct LocalAudioSink {
    mixer: MixerHandle,
    _handle: Arc<AudioThreadHandle>,
}

impl AudioSink for LocalAudioSink {
    fn current_time(&self) -> f64 {
        self.mixer.current_time()
    }

    fn schedule(
        &self,
        id: PlaybackId,
        buffer: AudioBuffer,
        start_at: f64,
    ) -> Result<(), VoiceError> {
        self.mixer.schedule(id, buffer, start_at)
    }

    fn stop(&self, id: PlaybackId) {
        self.mixer.stop(id);
    }

    fn stop_all(&self) {
        self.mixer.stop_all();
    }
}

// ── Constructor ────────────────────────────────────────────────────

/// Spawn one [`AudioThreadHandle`] and return a matched source/sink pair.
///
/// # Errors
///
/// [`VoiceError::NoInputDevice`] or [`VoiceError::MicrophoneUnavailable`]
/// when the microphone cannot be acquired; [`VoiceError::OutputStreamError`]
/// when the output device cannot be opened.
pub fn new_pair(
    playback_sample_rate: u32,
    ended: PlaybackEndedSender,
) -> Result<(LocalAudioSource, LocalAudioSink), VoiceError> {
    let (handle, mixer) = AudioThreadHandle::spawn(playback_sample_rate, ended)?;
    let handle = Arc::new(handle);
    let source = LocalAudioSource {
        handle: Arc::clone(&handle),
    };
    let sink = LocalAudioSink {
        mixer,
        _handle: handle,
    };
    Ok((source, sink))
}

/// [`AudioDevices`] backed by the machine's default input and output.
#[derive(Debug, Clone, Copy)]
pub struct LocalAudioDevices {
    playback_sample_rate: u32,
}

impl LocalAudioDevices {
    pub const fn new(playback_sample_rate: u32) -> Self {
        Self {
            playback_sample_rate,
        }
    }
}

impl Default for LocalAudioDevices {
    fn default() -> Self {
        Self::new(PLAYBACK_SAMPLE_RATE)
    }
}

impl AudioDevices for LocalAudioDevices {
    fn open(&self, ended: PlaybackEndedSender) -> Result<AudioPair, VoiceError> {
        let (source, sink) = new_pair(self.playback_sample_rate, ended)?;
        Ok(AudioPair {
            source: Box::new(source),
            sink: Box::new(sink),
        })
    }
}
