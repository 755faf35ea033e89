//! Devices command handler.
//!
//! Lists the audio devices cpal can see on the default host.

use anyhow::{Context, Result};
use cosmo_voice::{AudioDeviceInfo, list_input_devices, list_output_devices};

use crate::error::CliError;
use crate::presentation::{print_separator, truncate_string};

/// Execute the devices command.
pub fn execute() -> Result<()> {
    let inputs = list_input_devices()
        .map_err(CliError::from)
        .context("failed to enumerate input devices")?;
    let outputs = list_output_devices()
        .map_err(CliError::from)
        .context("failed to enumerate output devices")?;

    print_section("Input devices", &inputs);
    println!();
    print_section("Output devices", &outputs);
    Ok(())
}

fn print_section(title: &str, devices: &[AudioDeviceInfo]) {
    println!("{title} ({}):", devices.len());
    print_separator(60);
    if devices.is_empty() {
        println!("  (none found)");
        return;
    }
    for line in device_lines(devices) {
        println!("{line}");
    }
}

fn device_lines(devices: &[AudioDeviceInfo]) -> Vec<String> {
    devices
        .iter()
        .map(|device| {
            let marker = if device.is_default { "*" } else { " " };
            format!("{marker} {}", truncate_string(&device.name, 56))
        })
        .collect()
}
