//! PCM codec helpers: base64 payloads to float sample buffers and back.
//!
//! The realtime endpoint speaks little-endian 16-bit PCM wrapped in base64.
//! Capture produces normalised `f32` samples at 16 kHz mono; playback
//! receives 24 kHz mono by default.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::VoiceError;

/// Sample rate of outbound microphone audio.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Mime type attached to outbound microphone audio.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// A decoded, playable block of audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of interleaved channels.
    pub channels: u16,
}

impl AudioBuffer {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Playback duration in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Playback duration.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Down-mix to a single channel by averaging each frame.
    pub fn into_mono(self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples;
        }
        let channels = usize::from(self.channels);
        #[allow(clippy::cast_precision_loss)]
        let scale = channels as f32;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / scale)
            .collect()
    }
}

/// An outbound media payload: base64 PCM plus its mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    /// Base64-encoded little-endian i16 PCM.
    pub data: String,

    /// Mime type, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

/// Decode standard base64.
pub fn decode(base64: &str) -> Result<Vec<u8>, VoiceError> {
    Ok(STANDARD.decode(base64)?)
}

/// Interpret raw bytes as little-endian i16 PCM and normalise to `f32`.
///
/// A trailing odd byte and a trailing partial frame are dropped. A payload
/// that yields no complete frame is an error.
pub fn decode_audio_data(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<AudioBuffer, VoiceError> {
    let channels = channels.max(1);
    let mut samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    let whole = samples.len() - samples.len() % usize::from(channels);
    samples.truncate(whole);

    if samples.is_empty() {
        return Err(VoiceError::DecodeError(format!(
            "audio payload of {} bytes holds no complete frame",
            bytes.len()
        )));
    }

    Ok(AudioBuffer {
        samples,
        sample_rate,
        channels,
    })
}

/// Encode normalised samples as an outbound 16 kHz PCM blob.
pub fn create_blob(samples: &[f32]) -> MediaBlob {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
        pcm.extend_from_slice(&value.to_le_bytes());
    }

    MediaBlob {
        data: STANDARD.encode(pcm),
        mime_type: CAPTURE_MIME_TYPE.to_string(),
    }
}

/// Extract the `rate=` parameter from a PCM mime type.
pub fn sample_rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_malformed_base64() {
        let err = decode("not base64!!").unwrap_err();
        assert!(matches!(err, VoiceError::DecodeError(_)));
    }

    #[test]
    fn pcm_bytes_normalise_to_unit_range() {
        let bytes = [0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00];
        let buffer = decode_audio_data(&bytes, 24_000, 1).unwrap();
        assert_eq!(buffer.samples, vec![-1.0, 32767.0 / 32768.0, 0.0]);
        assert_eq!(buffer.frames(), 3);
    }

    #[test]
    fn odd_trailing_byte_is_truncated() {
        let bytes = [0x00, 0x40, 0x00, 0x40, 0x12];
        let buffer = decode_audio_data(&bytes, 24_000, 1).unwrap();
        assert_eq!(buffer.samples.len(), 2);
    }

    #[test]
    fn partial_stereo_frame_is_truncated() {
        let bytes = [0u8; 6];
        let buffer = decode_audio_data(&bytes, 24_000, 2).unwrap();
        assert_eq!(buffer.samples.len(), 2);
        assert_eq!(buffer.frames(), 1);
    }

    #[test]
    fn empty_payload_is_a_decode_error() {
        assert!(decode_audio_data(&[], 24_000, 1).is_err());
        assert!(decode_audio_data(&[0x01], 24_000, 1).is_err());
    }

    #[test]
    fn duration_follows_frames_and_rate() {
        let buffer = AudioBuffer {
            samples: vec![0.0; 12_000],
            sample_rate: 24_000,
            channels: 1,
        };
        assert!((buffer.duration_secs() - 0.5).abs() < f64::EPSILON);
        assert_eq!(buffer.duration(), Duration::from_millis(500));
    }

    #[test]
    fn blob_is_little_endian_pcm_at_capture_rate() {
        let blob = create_blob(&[0.0, 0.5, -1.0]);
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");

        let bytes = decode(&blob.data).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x40, 0x00, 0x80]);
    }

    #[test]
    fn blob_clamps_out_of_range_samples() {
        let blob = create_blob(&[1.0, 2.0, -3.0]);
        let bytes = decode(&blob.data).unwrap();
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![i16::MAX, i16::MAX, i16::MIN]);
    }

    #[test]
    fn captured_audio_survives_the_wire() {
        let samples = [0.25_f32, -0.25, 0.125];
        let blob = create_blob(&samples);
        let buffer = decode_audio_data(&decode(&blob.data).unwrap(), CAPTURE_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buffer.samples, samples);
    }

    #[test]
    fn rate_is_read_from_mime_parameters() {
        assert_eq!(sample_rate_from_mime("audio/pcm;rate=24000"), Some(24_000));
        assert_eq!(sample_rate_from_mime("audio/pcm; Rate = 16000"), Some(16_000));
        assert_eq!(sample_rate_from_mime("audio/pcm"), None);
        assert_eq!(sample_rate_from_mime("audio/pcm;rate=fast"), None);
    }

    #[test]
    fn stereo_buffers_mix_down_to_mono() {
        let buffer = AudioBuffer {
            samples: vec![0.5, 0.0, -0.5, -0.5],
            sample_rate: 24_000,
            channels: 2,
        };
        assert_eq!(buffer.into_mono(), vec![0.25, -0.5]);
    }
}
