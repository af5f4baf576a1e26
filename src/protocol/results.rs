//! Typed result payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gpio::{
    physical_header_map, Level, PinNumber, PinReading, EXCLUDED_PINS, VALID_PINS,
};

pub use crate::gpio::PinStatus;

/// Result of `setPin` and `readPin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinResult {
    pub pin: PinNumber,
    pub level: Level,
    #[serde(default)]
    pub message: String,
}

impl PinResult {
    #[must_use]
    pub fn set(reading: PinReading) -> Self {
        Self {
            pin: reading.pin,
            level: reading.level,
            message: format!("GPIO pin {} successfully set to {}", reading.pin, reading.level),
        }
    }

    #[must_use]
    pub fn read(reading: PinReading) -> Self {
        Self {
            pin: reading.pin,
            level: reading.level,
            message: format!("GPIO pin {} is {}", reading.pin, reading.level),
        }
    }
}

/// Result of `listValidPins`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidPins {
    pub valid_pins: Vec<PinNumber>,
    #[serde(default)]
    pub numbering_mode: String,
    #[serde(default)]
    pub total_pins: usize,
    /// `"GPIO <bcm>"` to `"Pin <physical>"`.
    #[serde(default)]
    pub physical_pins: BTreeMap<String, String>,
    /// Bus name to reserved pins.
    #[serde(default)]
    pub excluded_pins: BTreeMap<String, Vec<PinNumber>>,
}

impl ValidPins {
    #[must_use]
    pub fn board() -> Self {
        Self {
            valid_pins: VALID_PINS.to_vec(),
            numbering_mode: "BCM".to_string(),
            total_pins: VALID_PINS.len(),
            physical_pins: physical_header_map(),
            excluded_pins: EXCLUDED_PINS
                .iter()
                .map(|(bus, pins)| ((*bus).to_string(), pins.to_vec()))
                .collect(),
        }
    }
}

/// One entry of `listTools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result of `listTools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolList {
    pub tools: Vec<ToolDescriptor>,
}

/// Static electrical facts about the board's GPIO header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    pub model: String,
    pub header_pins: u8,
    pub gpio_lines: u8,
    pub usable_gpio: u8,
    pub voltage: String,
    pub max_current_per_pin_ma: u16,
    pub total_max_current_ma: u16,
}

impl BoardInfo {
    /// The Raspberry Pi 40-pin header.
    #[must_use]
    pub fn raspberry_pi() -> Self {
        Self {
            model: "Raspberry Pi (40-pin header)".to_string(),
            header_pins: 40,
            gpio_lines: 28,
            usable_gpio: u8::try_from(VALID_PINS.len()).unwrap_or(u8::MAX),
            voltage: "3.3V".to_string(),
            max_current_per_pin_ma: 16,
            total_max_current_ma: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Result of `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    /// Operation names the worker accepts.
    pub capabilities: Vec<String>,
    pub hardware_available: bool,
    /// Absent from workers that do not describe their board.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardInfo>,
}

/// Body of the HTTP liveness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: String,
    pub hardware_available: bool,
}

impl Health {
    #[must_use]
    pub fn healthy(hardware_available: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            hardware_available,
        }
    }
}
