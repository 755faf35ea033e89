//! Commands enum.

use clap::Subcommand;

/// Available commands for the Cosmo voice client.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive voice conversation (default)
    ///
    /// Enter starts and stops the session, `q` quits.
    Talk,

    /// List audio input and output devices
    Devices,

    /// Show the effective configuration (API key redacted)
    Config,
}
