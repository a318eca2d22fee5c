//! Error types for the light simulator
//!
//! Handler-level failures never surface here: they are logged and dropped
//! inside the agent. These cover startup and the binaries.

use crate::config::ConfigError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for simulator operations
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out: {message}")]
    Timeout { message: String },
}

impl SimulatorError {
    /// Create timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }
}

/// Result type for simulator operations
pub type SimulatorResult<T> = Result<T, SimulatorError>;
