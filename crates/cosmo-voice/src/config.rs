//! Session configuration.

use std::time::Duration;

use crate::capture_pipeline::CaptureConfig;
use crate::playback::PLAYBACK_SAMPLE_RATE;
use crate::realtime::{LiveConfig, Modality};

/// Default native-audio model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default persona prompt.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a futuristic AI entity named Cosmo, an expert on the cosmos, stars, and space exploration. Your voice is calm and synthesized. Your purpose is to provide fascinating and accurate knowledge about the universe in an engaging, conversational manner. Respond to queries with wonder and clarity.";

/// How long `Connecting` and `Disconnecting` may last.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything a [`VoiceSession`](crate::session::VoiceSession) needs besides
/// its transport and devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub live: LiveConfig,

    /// Upper bound on `Connecting` and on `Disconnecting`.
    pub connect_timeout: Duration,

    pub capture: CaptureConfig,

    /// Rate assumed for inbound audio whose mime type names none.
    pub playback_sample_rate: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            voice: None,
            response_modalities: vec![Modality::Audio],
            input_transcription: true,
            output_transcription: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            live: LiveConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            capture: CaptureConfig::default(),
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_cosmo_persona() {
        let config = SessionConfig::default();
        assert_eq!(config.live.model, DEFAULT_MODEL);
        assert!(config.live.system_instruction.starts_with("You are a futuristic AI entity named Cosmo"));
        assert_eq!(config.live.response_modalities, vec![Modality::Audio]);
        assert!(config.live.input_transcription && config.live.output_transcription);
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.capture.sample_rate, 16_000);
        assert_eq!(config.capture.frame_size, 4096);
        assert_eq!(config.playback_sample_rate, 24_000);
    }
}
