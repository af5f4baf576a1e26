//! Colored CLI display utilities for client output.
//!
//! Results go to stdout, errors to stderr.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::gpio::Level;
use crate::protocol::{PinResult, PinStatus, ToolList, ValidPins};
use crate::supervisor::ClientError;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to a maximum number of characters, adding ellipsis if
/// truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Render a level, green for HIGH.
#[must_use]
pub fn format_level(level: Level) -> String {
    match level {
        Level::High => level.as_str().green().bold().to_string(),
        Level::Low => level.as_str().dimmed().to_string(),
    }
}

/// Render an optional level; unknown until the first I/O.
#[must_use]
pub fn format_optional_level(level: Option<Level>) -> String {
    level.map_or_else(|| "-".dimmed().to_string(), format_level)
}

/// Print any result as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to render result"),
    }
    let _ = io::stdout().flush();
}

/// Print the outcome of a set or read.
pub fn print_pin_result(result: &PinResult) {
    println!(
        "{} {} pin={} level={}",
        timestamp().dimmed(),
        "[GPIO]".cyan().bold(),
        result.pin,
        format_level(result.level)
    );
    if !result.message.is_empty() {
        println!("  {}", result.message.dimmed());
    }
    let _ = io::stdout().flush();
}

/// Print the claimed-pin report.
pub fn print_status(status: &PinStatus) {
    let hardware = if status.hardware_available {
        "available".green().to_string()
    } else {
        "unavailable".red().to_string()
    };
    println!(
        "{} {} backend={} hardware={} claimed={}",
        timestamp().dimmed(),
        "[STATUS]".blue().bold(),
        status.backend.cyan(),
        hardware,
        status.count
    );
    for pin in &status.pins {
        println!(
            "  GPIO {:>2}  {:<6} {}",
            pin.pin,
            pin.mode.as_str(),
            format_optional_level(pin.level)
        );
    }
    let _ = io::stdout().flush();
}

/// Print the valid pins with their physical header positions.
pub fn print_valid_pins(pins: &ValidPins) {
    println!(
        "{} {} {} pins ({} numbering)",
        timestamp().dimmed(),
        "[PINS]".blue().bold(),
        pins.valid_pins.len(),
        if pins.numbering_mode.is_empty() {
            "BCM"
        } else {
            pins.numbering_mode.as_str()
        }
    );
    for pin in &pins.valid_pins {
        let physical = pins
            .physical_pins
            .get(&format!("GPIO {pin}"))
            .map_or(String::new(), |p| format!("({p})"));
        println!("  GPIO {:>2}  {}", pin, physical.dimmed());
    }
    for (bus, reserved) in &pins.excluded_pins {
        let reserved: Vec<String> = reserved.iter().map(ToString::to_string).collect();
        println!("  {} {}: {}", "reserved".yellow(), bus, reserved.join(", "));
    }
    let _ = io::stdout().flush();
}

/// Print the advertised tools.
pub fn print_tools(tools: &ToolList) {
    for tool in &tools.tools {
        println!(
            "{} {}",
            tool.name.bold(),
            truncate(&tool.description, DEFAULT_MAX_LEN).dimmed()
        );
    }
    let _ = io::stdout().flush();
}

/// Print a client error, with any captured worker diagnostics.
pub fn print_error(error: &ClientError) {
    eprintln!(
        "{} {} {}",
        timestamp().dimmed(),
        "[ERROR]".red().bold(),
        error.to_string().red()
    );
    if let ClientError::StartupFailure { diagnostics, .. } = error {
        for line in diagnostics {
            eprintln!("  {}", truncate(line, 200).dimmed());
        }
    }
    let _ = io::stderr().flush();
}

/// Print a plain error message.
pub fn print_failure(message: &str) {
    eprintln!(
        "{} {} {}",
        timestamp().dimmed(),
        "[ERROR]".red().bold(),
        message.red()
    );
    let _ = io::stderr().flush();
}
