//! Configuration system for the light simulator
//!
//! Every field has a default so the simulator runs with no file at all; a TOML
//! file only needs to name what it overrides.

use crate::protocol::{LightTopics, TopicError};
use crate::transport::mqtt::{parse_broker_url, ReconnectConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default locations searched when no explicit config path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["light-sim.toml", "config/light-sim.toml"];

/// Main simulator configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub mqtt: MqttSection,
}

/// Device identity and topic group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Topic group; the base topic is `<group>/light_control`
    #[serde(default = "default_group")]
    pub group: String,
    /// Client identifier prefix; a timestamp is appended per process
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            group: default_group(),
            client_id_prefix: default_client_id_prefix(),
        }
    }
}

fn default_group() -> String {
    "/student_group".to_string()
}

fn default_client_id_prefix() -> String {
    "light_simulator".to_string()
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port (`mqtt://` or `mqtts://`)
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Unexpected disconnects tolerated before the simulator gives up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            keep_alive_secs: default_keep_alive(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect: ReconnectSection::default(),
        }
    }
}

fn default_broker_url() -> String {
    "mqtt://broker.emqx.io:1883".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

/// Delay schedule between reconnection attempts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    /// Delays in milliseconds for the first attempts, in order
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    /// Delay used once `backoff_ms` is exhausted
    #[serde(default = "default_sustained_delay_ms")]
    pub sustained_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
            sustained_delay_ms: default_sustained_delay_ms(),
        }
    }
}

fn default_backoff_ms() -> Vec<u64> {
    ReconnectConfig::default().backoff_pattern
}

fn default_sustained_delay_ms() -> u64 {
    ReconnectConfig::default().sustained_delay
}

impl ReconnectSection {
    pub fn to_reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            backoff_pattern: self.backoff_ms.clone(),
            sustained_delay: self.sustained_delay_ms,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid topic group: {0}")]
    InvalidGroup(#[from] TopicError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SimulatorConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SimulatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field ranges and the topic group
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.topics()?;
        parse_broker_url(&self.mqtt.broker_url)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        if self.device.client_id_prefix.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.client_id_prefix must not be empty".to_string(),
            ));
        }
        if self.mqtt.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.keep_alive_secs must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.max_reconnect_attempts must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.reconnect.sustained_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.reconnect.sustained_delay_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Topics derived from the configured group
    pub fn topics(&self) -> Result<LightTopics, ConfigError> {
        Ok(LightTopics::new(&self.device.group)?)
    }
}
