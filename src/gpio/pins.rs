//! Pin numbering, logic levels and the board allow-list.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// BCM pin number.
pub type PinNumber = u8;

/// Pins usable as plain GPIO (BCM numbering).
///
/// Excludes I2C (2, 3), UART (14, 15) and SPI (7-11).
pub const VALID_PINS: [PinNumber; 17] = [
    4, 5, 6, 12, 13, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// Pins reserved for on-board buses, grouped by bus.
pub const EXCLUDED_PINS: [(&str, &[PinNumber]); 3] = [
    ("I2C (SDA, SCL)", &[2, 3]),
    ("UART (TXD, RXD)", &[14, 15]),
    ("SPI interface", &[7, 8, 9, 10, 11]),
];

/// BCM number to physical 40-pin header position.
const PHYSICAL_HEADER: [(PinNumber, u8); 17] = [
    (4, 7),
    (5, 29),
    (6, 31),
    (12, 32),
    (13, 33),
    (16, 36),
    (17, 11),
    (18, 12),
    (19, 35),
    (20, 38),
    (21, 40),
    (22, 15),
    (23, 16),
    (24, 18),
    (25, 22),
    (26, 37),
    (27, 13),
];

/// Returns `true` if `pin` is in the allow-list.
#[must_use]
pub fn is_valid_pin(pin: i64) -> bool {
    PinNumber::try_from(pin).is_ok_and(|p| VALID_PINS.contains(&p))
}

/// Physical header position for a BCM pin, if it is in the allow-list.
#[must_use]
pub fn physical_header_pin(pin: PinNumber) -> Option<u8> {
    PHYSICAL_HEADER
        .iter()
        .find(|(bcm, _)| *bcm == pin)
        .map(|(_, physical)| *physical)
}

/// Map of `"GPIO <bcm>"` to `"Pin <physical>"` labels.
#[must_use]
pub fn physical_header_map() -> BTreeMap<String, String> {
    PHYSICAL_HEADER
        .iter()
        .map(|(bcm, physical)| (format!("GPIO {bcm}"), format!("Pin {physical}")))
        .collect()
}

/// Logic level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    High,
    Low,
}

impl Level {
    /// Parse a user-supplied state token.
    ///
    /// Case-insensitive, surrounding whitespace ignored. Accepts
    /// `high`/`on`/`1`/`true` and `low`/`off`/`0`/`false`.
    #[must_use]
    pub fn parse_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "high" | "on" | "1" | "true" => Some(Self::High),
            "low" | "off" | "0" | "false" => Some(Self::Low),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Low => "LOW",
        }
    }

    #[must_use]
    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction a pin has been claimed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    Output,
    Input,
}

impl PinMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Input => "input",
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
