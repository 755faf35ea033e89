//! Main CLI parser and top-level argument handling.
//!
//! This module defines the root CLI structure with global options.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface definition for the Cosmo voice client.
///
/// This is the top-level parser that handles global options and dispatches
/// to subcommands. With no subcommand, `talk` runs.
#[derive(Parser, Debug)]
#[command(name = "cosmo")]
#[command(about = "Talk to Cosmo, a voice guide to the universe")]
#[command(version)]
pub struct Cli {
    /// Gemini API key (falls back to GEMINI_API_KEY, then API_KEY)
    #[arg(long = "api-key", global = true)]
    pub api_key: Option<String>,

    /// Realtime model to talk to
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Prebuilt voice name (server default when omitted)
    #[arg(long, global = true)]
    pub voice: Option<String>,

    /// Replace the Cosmo persona instruction
    #[arg(long, global = true)]
    pub instruction: Option<String>,

    /// Seconds to wait for the session to open or close
    #[arg(long = "connect-timeout", global = true, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Override the realtime WebSocket endpoint
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
