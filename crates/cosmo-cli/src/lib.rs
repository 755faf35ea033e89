//! Terminal front-end for talking to Cosmo.
//!
//! Parses flags, resolves configuration and drives a
//! [`cosmo_voice::VoiceSession`] from the keyboard.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tokio_test as _;

// Used by the binary only.
use dotenvy as _;
use tracing_subscriber as _;

pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

// Re-export primary types for convenient access
pub use commands::Commands;
pub use config::{ApiKeySource, CliConfig, resolve_api_key};
pub use error::CliError;
pub use parser::Cli;
