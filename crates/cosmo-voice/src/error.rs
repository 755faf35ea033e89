//! Voice session error types.

use std::time::Duration;

/// Coarse failure category, used to pick the user-facing notice and the CLI
/// exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Microphone denied or unavailable.
    Permission,
    /// The remote session could not be opened.
    Connect,
    /// The remote side reported a failure mid-session.
    Remote,
    /// Inbound audio could not be decoded.
    Decode,
    /// Local audio device or audio thread failure.
    Audio,
    /// Operation not valid in the current session state.
    State,
}

/// Errors that can occur in the voice session.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// No audio input device found.
    #[error("No audio input device found")]
    NoInputDevice,

    /// Microphone access denied or the device refused to open.
    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    /// Failed to open audio input stream.
    #[error("Failed to open audio input stream: {0}")]
    InputStreamError(String),

    /// Failed to open audio output stream.
    #[error("Failed to open audio output stream: {0}")]
    OutputStreamError(String),

    /// The realtime session failed to open.
    #[error("Failed to open realtime session: {0}")]
    ConnectError(String),

    /// The realtime session did not become ready in time.
    #[error("Realtime session did not open within {0:?}")]
    ConnectTimeout(Duration),

    /// Mid-session failure reported by the remote side.
    #[error("Realtime session failed: {0}")]
    RemoteError(String),

    /// Malformed inbound audio.
    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    /// Malformed protocol message.
    #[error("Protocol error: {0}")]
    ProtocolError(#[from] serde_json::Error),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    ResampleError(String),

    /// The dedicated audio thread exited unexpectedly.
    #[error("Audio thread is not running")]
    AudioThreadDied,

    /// A session is already connecting or connected.
    #[error("Voice session is already active")]
    AlreadyActive,

    /// No session is active.
    #[error("Voice session is not active")]
    NotActive,
}

impl VoiceError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoInputDevice | Self::MicrophoneUnavailable(_) => ErrorKind::Permission,
            Self::ConnectError(_) | Self::ConnectTimeout(_) => ErrorKind::Connect,
            Self::RemoteError(_) | Self::ProtocolError(_) => ErrorKind::Remote,
            Self::DecodeError(_) => ErrorKind::Decode,
            Self::InputStreamError(_)
            | Self::OutputStreamError(_)
            | Self::ResampleError(_)
            | Self::AudioThreadDied => ErrorKind::Audio,
            Self::AlreadyActive | Self::NotActive => ErrorKind::State,
        }
    }
}

impl From<base64::DecodeError> for VoiceError {
    fn from(err: base64::DecodeError) -> Self {
        Self::DecodeError(err.to_string())
    }
}
