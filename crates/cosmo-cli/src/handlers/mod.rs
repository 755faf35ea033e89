//! Command handlers.
//!
//! Each handler exposes `execute` and returns `anyhow::Result<()>`:
//! 1. Validate what the command needs from [`CliConfig`](crate::CliConfig)
//! 2. Call into `cosmo-voice`
//! 3. Format output for the terminal

pub mod config;
pub mod devices;
pub mod talk;
