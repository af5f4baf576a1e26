//! gpio-bridge - Supervised GPIO worker over a JSON-line or HTTP channel.

pub mod config;
pub mod display;
pub mod gpio;
pub mod protocol;
pub mod supervisor;
pub mod worker;
