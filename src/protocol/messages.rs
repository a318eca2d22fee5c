//! Light control message contracts
//!
//! All payloads on the wire are plain UTF-8 text. The light publishes its
//! state as the literal `ON`/`OFF`, accepts the same literals as commands on
//! the base topic, and answers `STATUS` polls on the request sub-topic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status poll payload accepted on the request topic
pub const STATUS_REQUEST: &str = "STATUS";

/// Last will registered with the broker, published when the session dies uncleanly
pub const LAST_WILL_PAYLOAD: &str = "Light simulator disconnected unexpectedly";

/// Notice published on graceful shutdown before the clean DISCONNECT
pub const SHUTDOWN_NOTICE: &str = "Light simulator disconnected";

/// Logical state of the simulated light fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LightState {
    On,
    #[default]
    Off,
}

impl LightState {
    /// Wire representation of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            LightState::On => "ON",
            LightState::Off => "OFF",
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload that is neither `ON` nor `OFF`
#[derive(Debug, Error, PartialEq)]
#[error("invalid light command: {0:?}")]
pub struct InvalidCommand(pub String);

impl FromStr for LightState {
    type Err = InvalidCommand;

    /// Exact, case-sensitive match. Callers trim surrounding whitespace first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(LightState::On),
            "OFF" => Ok(LightState::Off),
            other => Err(InvalidCommand(other.to_string())),
        }
    }
}

/// Human-readable description of an MQTT 3.1.1 CONNACK return code
pub fn describe_connect_code(code: u8) -> &'static str {
    match code {
        0 => "Connected successfully",
        1 => "Incorrect protocol version",
        2 => "Invalid client identifier",
        3 => "Server unavailable",
        4 => "Bad username or password",
        5 => "Not authorized",
        _ => "Unknown error",
    }
}
