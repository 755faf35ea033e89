//! CLI-specific error types and mappings.
//!
//! Maps configuration and voice-session failures to exit codes and
//! user-facing messages.

use cosmo_voice::{ErrorKind, VoiceError};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// General failure.
    #[error("{0}")]
    General(String),

    /// Argument parsing error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (terminal unavailable, broken pipe, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error (missing API key, bad flag value).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Microphone or speaker unavailable.
    #[error("Audio device error: {0}")]
    Device(String),

    /// The realtime service could not be reached or failed mid-session.
    #[error("Service error: {0}")]
    Service(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 0: Success
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::General(_) => 1,
            Self::Arguments(_) => 2,  // EX_USAGE
            Self::Io(_) => 74,        // EX_IOERR
            Self::Config(_) => 78,    // EX_CONFIG
            Self::Device(_) => 72,    // EX_OSFILE (closest fit)
            Self::Service(_) => 69,   // EX_UNAVAILABLE
        }
    }
}

impl From<VoiceError> for CliError {
    fn from(err: VoiceError) -> Self {
        match err.kind() {
            ErrorKind::Permission | ErrorKind::Audio => Self::Device(err.to_string()),
            ErrorKind::Connect | ErrorKind::Remote | ErrorKind::Decode => {
                Self::Service(err.to_string())
            }
            ErrorKind::State => Self::General(err.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_errors_map_to_categories() {
        let err = CliError::from(VoiceError::NoInputDevice);
        assert!(matches!(err, CliError::Device(_)));
        assert_eq!(err.exit_code(), 72);

        let err = CliError::from(VoiceError::ConnectError("refused".into()));
        assert!(matches!(err, CliError::Service(_)));
        assert_eq!(err.exit_code(), 69);
    }

    #[test]
    fn terminal_write_failures_use_ex_ioerr() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed");
        let err = anyhow::Error::from(CliError::from(io));
        let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        assert_eq!(code, 74);
    }

    #[test]
    fn config_errors_use_ex_config() {
        assert_eq!(CliError::Config("missing key".into()).exit_code(), 78);
    }
}
