//! Audio playback module: scheduled speech output via `rodio`.
//!
//! A single endless [`MixerSource`] is handed to the output stream. Buffers
//! are placed on a shared timeline at absolute frame positions and the
//! source sums whatever overlaps each rendered block. The number of frames
//! rendered so far is the output clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use rubato::{FftFixedIn, Resampler as _};

use crate::audio_io::PlaybackEndedSender;
use crate::capture::AudioDeviceInfo;
use crate::codec::AudioBuffer;
use crate::error::VoiceError;
use crate::scheduler::PlaybackId;

/// Default output rate; matches the rate of inbound speech.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Frames rendered per lock of the timeline (10 ms at 24 kHz).
const BLOCK_FRAMES: usize = 240;

struct Voice {
    id: PlaybackId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

#[derive(Default)]
struct Timeline {
    voices: Vec<Voice>,
}

/// Control side of the mixer. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct MixerHandle {
    timeline: Arc<Mutex<Timeline>>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
}

impl MixerHandle {
    /// Create a mixer running at `sample_rate`, returning the handle and the
    /// source to hand to the output stream.
    pub fn new(sample_rate: u32, ended: PlaybackEndedSender) -> (Self, MixerSource) {
        let handle = Self {
            timeline: Arc::new(Mutex::new(Timeline::default())),
            clock: Arc::new(AtomicU64::new(0)),
            sample_rate,
        };
        let source = MixerSource {
            handle: handle.clone(),
            ended,
            block: Vec::with_capacity(BLOCK_FRAMES),
            pos: 0,
        };
        (handle, source)
    }

    /// Output clock in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / f64::from(self.sample_rate)
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Place `buffer` on the timeline at `start_at` seconds.
    pub fn schedule(
        &self,
        id: PlaybackId,
        buffer: AudioBuffer,
        start_at: f64,
    ) -> Result<(), VoiceError> {
        let source_rate = buffer.sample_rate;
        let mono = buffer.into_mono();
        let samples = if source_rate == self.sample_rate {
            mono
        } else {
            resample(&mono, source_rate, self.sample_rate)?
        };

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let start_frame = (start_at.max(0.0) * f64::from(self.sample_rate)).round() as u64;

        let mut timeline = self
            .timeline
            .lock()
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        timeline.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
        Ok(())
    }

    /// Remove one buffer without reporting it as ended.
    pub fn stop(&self, id: PlaybackId) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.voices.retain(|v| v.id != id);
        }
    }

    /// Remove every buffer without reporting any as ended.
    pub fn stop_all(&self) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.voices.clear();
        }
    }

    /// Number of buffers still on the timeline.
    pub fn pending(&self) -> usize {
        self.timeline.lock().map(|t| t.voices.len()).unwrap_or(0)
    }
}

/// Endless mono source that renders the timeline.
pub struct MixerSource {
    handle: MixerHandle,
    ended: PlaybackEndedSender,
    block: Vec<f32>,
    pos: usize,
}

impl MixerSource {
    fn render_block(&mut self) {
        self.block.clear();
        self.block.resize(BLOCK_FRAMES, 0.0);
        self.pos = 0;

        let base = self.handle.clock.load(Ordering::Acquire);
        let block_end = base + BLOCK_FRAMES as u64;

        let Ok(mut timeline) = self.handle.timeline.lock() else {
            self.handle.clock.store(block_end, Ordering::Release);
            return;
        };

        for voice in &timeline.voices {
            let from = voice.start_frame.max(base);
            let to = voice.end_frame().min(block_end);
            if from >= to {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            for frame in from..to {
                self.block[(frame - base) as usize] +=
                    voice.samples[(frame - voice.start_frame) as usize];
            }
        }

        let ended = &self.ended;
        timeline.voices.retain(|voice| {
            if voice.end_frame() <= block_end {
                let _ = ended.send(voice.id);
                false
            } else {
                true
            }
        });
        drop(timeline);

        for sample in &mut self.block {
            *sample = sample.clamp(-1.0, 1.0);
        }
        self.handle.clock.store(block_end, Ordering::Release);
    }
}

impl Iterator for MixerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.block.len() {
            self.render_block();
        }
        let sample = self.block[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl rodio::Source for MixerSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.handle.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// List available audio output devices.
pub fn list_output_devices() -> Result<Vec<AudioDeviceInfo>, VoiceError> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let devices = host
        .output_devices()
        .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| AudioDeviceInfo {
            is_default: name == default_name,
            name,
        })
        .collect())
}

/// One-shot FFT resampling for buffers that arrive at a foreign rate.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, VoiceError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        1024,
        2, // sub-chunks for quality
        1, // mono
    )
    .map_err(|e| VoiceError::ResampleError(e.to_string()))?;

    let chunk_size = resampler.input_frames_next();
    let mut output = Vec::new();
    let mut pos = 0;
    while pos + chunk_size <= samples.len() {
        let result = resampler
            .process(&[&samples[pos..pos + chunk_size]], None)
            .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
        pos += chunk_size;
    }

    // Pad the tail and keep only its proportional share of output.
    if pos < samples.len() {
        let remaining = &samples[pos..];
        let mut padded = vec![0.0f32; chunk_size];
        padded[..remaining.len()].copy_from_slice(remaining);

        let result = resampler
            .process(&[&padded], None)
            .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
        if let Some(channel) = result.first() {
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let output_len = (remaining.len() as f64 * f64::from(to_rate) / f64::from(from_rate))
                .ceil() as usize;
            output.extend_from_slice(&channel[..output_len.min(channel.len())]);
        }
    }

    Ok(output)
}
