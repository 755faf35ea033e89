//! Audio capture module: microphone input via `cpal`.
//!
//! Opens the default input device when constructed (that is the permission
//! point) and keeps the stream paused until capture is armed. Each device
//! callback is down-mixed to mono and forwarded as a [`CapturedChunk`];
//! resampling and framing happen downstream in
//! [`capture_pipeline`](crate::capture_pipeline).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

use crate::audio_io::{CapturedChunk, ChunkSender};
use crate::error::VoiceError;

/// Audio capture handle.
///
/// Owns the `cpal` input stream. `cpal::Stream` is `!Send`, so this lives on
/// the audio thread (see [`audio_thread`](crate::audio_thread)).
pub struct AudioCapture {
    stream: Stream,

    /// Where the callback delivers chunks; `None` while disarmed.
    sender: Arc<Mutex<Option<ChunkSender>>>,

    is_capturing: Arc<AtomicBool>,
}

/// Information about an available audio device.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Whether this is the system default device.
    pub is_default: bool,
}

impl AudioCapture {
    /// Acquire the default input device.
    ///
    /// The stream is built but paused; nothing is delivered until
    /// [`start`](Self::start).
    pub fn new() -> Result<Self, VoiceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(VoiceError::NoInputDevice)?;

        let config = device
            .default_input_config()
            .map_err(|e| VoiceError::MicrophoneUnavailable(e.to_string()))?;

        let device_sample_rate = config.sample_rate().0;
        let sender = Arc::new(Mutex::new(None));
        let is_capturing = Arc::new(AtomicBool::new(false));

        let stream = build_input_stream(
            &device,
            &config,
            Arc::clone(&sender),
            Arc::clone(&is_capturing),
        )?;

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = device_sample_rate,
            channels = config.channels(),
            "Audio capture initialized"
        );

        Ok(Self {
            stream,
            sender,
            is_capturing,
        })
    }

    /// Arm capture and deliver chunks to `chunks`.
    pub fn start(&self, chunks: ChunkSender) -> Result<(), VoiceError> {
        if let Ok(mut slot) = self.sender.lock() {
            *slot = Some(chunks);
        }

        self.stream
            .play()
            .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;

        self.is_capturing.store(true, Ordering::SeqCst);
        tracing::debug!("Audio capture started");
        Ok(())
    }

    /// Disarm capture. The device stays acquired until drop.
    pub fn stop(&self) {
        self.is_capturing.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.sender.lock() {
            *slot = None;
        }
        if let Err(e) = self.stream.pause() {
            tracing::debug!(%e, "Input stream pause failed");
        }
        tracing::debug!("Audio capture stopped");
    }

    /// Check if currently capturing.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }
}

/// List available audio input devices.
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, VoiceError> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let devices = host
        .input_devices()
        .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| AudioDeviceInfo {
            is_default: name == default_name,
            name,
        })
        .collect())
}

/// Build a paused cpal input stream that forwards mono chunks while armed.
fn build_input_stream(
    device: &Device,
    config: &cpal::SupportedStreamConfig,
    sender: Arc<Mutex<Option<ChunkSender>>>,
    is_capturing: Arc<AtomicBool>,
) -> Result<Stream, VoiceError> {
    let stream_config: StreamConfig = config.clone().into();
    let sample_format = config.sample_format();
    let channels = config.channels();
    let sample_rate = config.sample_rate().0;

    let forward = move |samples: Vec<f32>| {
        if !is_capturing.load(Ordering::Relaxed) {
            return;
        }
        let Ok(slot) = sender.lock() else { return };
        if let Some(tx) = slot.as_ref() {
            let _ = tx.send(CapturedChunk {
                samples: downmix(&samples, channels),
                sample_rate,
            });
        }
    };

    let err_fn = |err: cpal::StreamError| {
        tracing::error!(%err, "Audio input stream error");
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| forward(data.to_vec()),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                forward(data.iter().map(|&s| f32::from(s) / 32768.0).collect());
            },
            err_fn,
            None,
        ),
        SampleFormat::I32 => device.build_input_stream(
            &stream_config,
            move |data: &[i32], _: &cpal::InputCallbackInfo| {
                #[allow(clippy::cast_precision_loss)]
                forward(data.iter().map(|&s| s as f32 / 2_147_483_648.0).collect());
            },
            err_fn,
            None,
        ),
        _ => {
            return Err(VoiceError::InputStreamError(format!(
                "Unsupported sample format: {sample_format:?}"
            )));
        }
    };

    let stream = stream.map_err(|e| VoiceError::MicrophoneUnavailable(e.to_string()))?;
    // Some hosts start streams on build.
    let _ = stream.pause();
    Ok(stream)
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = usize::from(channels);
    #[allow(clippy::cast_precision_loss)]
    let scale = channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / scale)
        .collect()
}
