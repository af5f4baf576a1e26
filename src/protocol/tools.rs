//! Tool descriptors advertised by `listTools`.

use serde_json::json;

use super::{Operation, ToolDescriptor};
use crate::gpio::VALID_PINS;

fn pin_property() -> serde_json::Value {
    json!({
        "type": "integer",
        "description": "GPIO pin number (BCM numbering)",
        "enum": VALID_PINS,
    })
}

/// The fixed tool set.
#[must_use]
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: Operation::SetPin.as_str().to_string(),
            description: "Set a GPIO pin to high or low state".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pin": pin_property(),
                    "state": {
                        "type": "string",
                        "description": "Pin state to set",
                        "enum": ["high", "low", "on", "off", "1", "0", "true", "false"],
                    },
                },
                "required": ["pin", "state"],
            }),
        },
        ToolDescriptor {
            name: Operation::ReadPin.as_str().to_string(),
            description: "Read the current state of a GPIO pin".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "pin": pin_property() },
                "required": ["pin"],
            }),
        },
        ToolDescriptor {
            name: Operation::GetStatus.as_str().to_string(),
            description: "Get the status of all claimed GPIO pins and the controller".to_string(),
            input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
        },
        ToolDescriptor {
            name: Operation::ListValidPins.as_str().to_string(),
            description: "List all GPIO pins usable on this board".to_string(),
            input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
        },
    ]
}
