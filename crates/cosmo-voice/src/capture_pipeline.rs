//! Capture pipeline: device chunks to fixed-size 16 kHz frames to outbound
//! media.
//!
//! The device delivers blocks of arbitrary size at its native rate.
//! [`FrameProcessor`] resamples them to the target rate and cuts them into
//! frames of exactly `frame_size` samples; [`CapturePipeline`] runs that on a
//! tokio task and forwards every frame to the realtime link as a PCM blob.

use rubato::{FftFixedIn, Resampler as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio_io::{AudioSource, CapturedChunk};
use crate::codec::{CAPTURE_SAMPLE_RATE, create_blob};
use crate::error::VoiceError;
use crate::realtime::Outbound;

/// Input block size handed to the resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Outbound capture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Rate of outbound frames in Hz.
    pub sample_rate: u32,

    /// Samples per outbound frame.
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            frame_size: 4096,
        }
    }
}

// ── FrameProcessor ─────────────────────────────────────────────────

/// Resamples captured audio and slices it into fixed-size frames.
pub struct FrameProcessor {
    frame_size: usize,
    target_rate: u32,

    /// Samples at the target rate not yet emitted.
    pending: Vec<f32>,

    resampler: Option<StreamResampler>,
}

struct StreamResampler {
    from_rate: u32,
    inner: FftFixedIn<f32>,

    /// Samples at the device rate waiting for a full resampler block.
    input: Vec<f32>,
}

impl FrameProcessor {
    pub fn new(frame_size: usize, target_rate: u32) -> Self {
        Self {
            frame_size: frame_size.max(1),
            target_rate,
            pending: Vec::new(),
            resampler: None,
        }
    }

    /// Feed one chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &CapturedChunk) -> Result<Vec<Vec<f32>>, VoiceError> {
        if chunk.sample_rate == self.target_rate {
            self.pending.extend_from_slice(&chunk.samples);
        } else {
            let resampled = self.resample(chunk)?;
            self.pending.extend_from_slice(&resampled);
        }

        let complete = self.pending.len() / self.frame_size;
        let frames = self
            .pending
            .drain(..complete * self.frame_size)
            .collect::<Vec<_>>()
            .chunks_exact(self.frame_size)
            .map(<[f32]>::to_vec)
            .collect();
        Ok(frames)
    }

    /// Samples held back waiting for a full frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn resample(&mut self, chunk: &CapturedChunk) -> Result<Vec<f32>, VoiceError> {
        let stale = self
            .resampler
            .as_ref()
            .is_none_or(|r| r.from_rate != chunk.sample_rate);
        if stale {
            let inner = FftFixedIn::<f32>::new(
                chunk.sample_rate as usize,
                self.target_rate as usize,
                RESAMPLE_CHUNK,
                2, // sub-chunks for quality
                1, // mono
            )
            .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
            tracing::debug!(
                from = chunk.sample_rate,
                to = self.target_rate,
                "Capture resampler configured"
            );
            self.resampler = Some(StreamResampler {
                from_rate: chunk.sample_rate,
                inner,
                input: Vec::new(),
            });
        }

        let Some(stream) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };
        stream.input.extend_from_slice(&chunk.samples);

        let mut output = Vec::new();
        loop {
            let needed = stream.inner.input_frames_next();
            if stream.input.len() < needed {
                break;
            }
            let block: Vec<f32> = stream.input.drain(..needed).collect();
            let result = stream
                .inner
                .process(&[block], None)
                .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
            if let Some(channel) = result.first() {
                output.extend_from_slice(channel);
            }
        }
        Ok(output)
    }
}

// ── CapturePipeline ────────────────────────────────────────────────

/// Running capture: microphone chunks in, media blobs out.
pub struct CapturePipeline {
    task: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    /// Arm `source` and start forwarding frames to `outbound`.
    pub fn start(
        source: &dyn AudioSource,
        outbound: mpsc::UnboundedSender<Outbound>,
        config: &CaptureConfig,
    ) -> Result<Self, VoiceError> {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<CapturedChunk>();
        source.start_capture(chunk_tx)?;

        let mut processor = FrameProcessor::new(config.frame_size, config.sample_rate);
        let task = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let frames = match processor.push(&chunk) {
                    Ok(frames) => frames,
                    Err(e) => {
                        tracing::warn!(%e, "Dropping captured chunk");
                        continue;
                    }
                };
                for frame in frames {
                    if outbound.send(Outbound::Media(create_blob(&frame))).is_err() {
                        tracing::debug!("Realtime link closed, capture forwarding ends");
                        return;
                    }
                }
            }
        });

        tracing::debug!(
            frame_size = config.frame_size,
            sample_rate = config.sample_rate,
            "Capture pipeline started"
        );
        Ok(Self { task: Some(task) })
    }

    /// Stop forwarding. Safe to call more than once.
    pub fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Capture pipeline torn down");
        }
    }

    pub const fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
