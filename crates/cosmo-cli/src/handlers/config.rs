//! Config command handler.
//!
//! Shows the effective configuration in `key = value` form. The API key is
//! redacted.

use std::fmt::Write as _;

use anyhow::Result;

use crate::config::CliConfig;
use crate::presentation::{format_optional, truncate_string};

/// Execute the config command.
pub fn execute(config: &CliConfig) -> Result<()> {
    print!("{}", render(config));
    Ok(())
}

fn render(config: &CliConfig) -> String {
    let session = &config.session;
    let live = &session.live;
    let api_key = config.api_key.as_ref().map_or_else(
        || "(not set)".to_string(),
        |key| format!("{} (from {})", key.redacted(), key.source),
    );
    let modalities = live
        .response_modalities
        .iter()
        .map(|m| format!("{m:?}").to_lowercase())
        .collect::<Vec<_>>()
        .join(",");

    let mut out = String::new();
    let mut line = |key: &str, value: &dyn std::fmt::Display| {
        let _ = writeln!(out, "{key:<22} = {value}");
    };
    line("api_key", &api_key);
    line("endpoint", &config.endpoint);
    line("model", &live.model);
    line("voice", &format_optional(&live.voice, "(server default)"));
    line("response_modalities", &modalities);
    line("input_transcription", &live.input_transcription);
    line("output_transcription", &live.output_transcription);
    line("connect_timeout_secs", &session.connect_timeout.as_secs());
    line("capture_sample_rate", &session.capture.sample_rate);
    line("capture_frame_size", &session.capture.frame_size);
    line("playback_sample_rate", &session.playback_sample_rate);
    line("system_instruction", &truncate_string(&live.system_instruction, 60));
    out
}
