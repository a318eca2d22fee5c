//! Pure connection state management for the MQTT session
//!
//! Broker URL parsing, client identifiers, session options with the last
//! will, and the reconnection delay schedule.

use crate::config::MqttSection;
use crate::protocol::{LightTopics, LAST_WILL_PAYLOAD};
use rumqttc::Transport as RumqttcTransport;
use rumqttc::{LastWill, MqttOptions, QoS};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state of the session as seen by the light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Network connection or CONNECT handshake in progress
    Connecting,
    /// Broker accepted the session
    Connected,
}

/// Delay schedule applied between reconnection attempts
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delays in milliseconds for the first attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![1000, 2000, 4000, 8000, 16000, 32000, 64000],
            sustained_delay: 120_000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay in milliseconds for the given 1-based attempt
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.calculate_backoff_delay(attempt))
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

/// Host, port and TLS flag extracted from a broker URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `mqtt://host[:port]` or `mqtts://host[:port]`
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerAddress, MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        _ => return Err(MqttError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Unique client identifier so simultaneous simulators never collide
pub fn generate_client_id(prefix: &str) -> String {
    format!("{prefix}_{}", chrono::Utc::now().timestamp_millis())
}

/// Base session options shared by the simulator and the operator tool:
/// clean session, keep-alive and TLS for `mqtts://`
pub fn configure_client_options(
    client_id: &str,
    broker_url: &str,
    keep_alive: Duration,
) -> Result<MqttOptions, MqttError> {
    let address = parse_broker_url(broker_url)?;

    let mut mqtt_options = MqttOptions::new(client_id, address.host, address.port);
    if address.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }
    mqtt_options.set_keep_alive(keep_alive);
    mqtt_options.set_clean_session(true);

    Ok(mqtt_options)
}

/// Session options for the light, including the retained last will on the base topic
pub fn configure_mqtt_options(
    client_id: &str,
    config: &MqttSection,
    topics: &LightTopics,
) -> Result<MqttOptions, MqttError> {
    let mut mqtt_options = configure_client_options(
        client_id,
        &config.broker_url,
        Duration::from_secs(config.keep_alive_secs),
    )?;

    let will = LastWill::new(topics.base(), LAST_WILL_PAYLOAD, QoS::AtLeastOnce, true);
    mqtt_options.set_last_will(will);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            ..MqttSection::default()
        }
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig {
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 500,
        };

        assert_eq!(config.calculate_backoff_delay(1), 25);
        assert_eq!(config.calculate_backoff_delay(2), 50);
        assert_eq!(config.calculate_backoff_delay(4), 250);

        // Pattern exhausted
        assert_eq!(config.calculate_backoff_delay(5), 500);
        assert_eq!(config.calculate_backoff_delay(100), 500);
    }

    #[test]
    fn test_backoff_attempt_zero_uses_first_delay() {
        let config = ReconnectConfig::default();
        assert_eq!(config.calculate_backoff_delay(0), 1000);
    }

    #[test]
    fn test_empty_pattern_uses_sustained_delay() {
        let config = ReconnectConfig {
            backoff_pattern: vec![],
            sustained_delay: 42,
        };
        assert_eq!(config.backoff_duration(1), Duration::from_millis(42));
    }

    #[test]
    fn test_parse_broker_url() {
        assert_eq!(
            parse_broker_url("mqtt://broker.emqx.io:1883").unwrap(),
            BrokerAddress {
                host: "broker.emqx.io".to_string(),
                port: 1883,
                tls: false,
            }
        );

        let tls = parse_broker_url("mqtts://secure.example.com").unwrap();
        assert_eq!(tls.port, 8883);
        assert!(tls.tls);

        assert_eq!(parse_broker_url("mqtt://localhost").unwrap().port, 1883);
    }

    #[test]
    fn test_invalid_broker_url() {
        assert!(matches!(
            parse_broker_url("invalid-url"),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
        assert!(matches!(
            parse_broker_url("http://localhost:1883"),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_client_id_uses_prefix() {
        let id = generate_client_id("light_simulator");
        let suffix = id.strip_prefix("light_simulator_").unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[test]
    fn test_configure_mqtt_options_sets_session_parameters() {
        let topics = LightTopics::new("/student_group").unwrap();
        let options = configure_mqtt_options("light_simulator_1", &test_mqtt_config(), &topics)
            .expect("options should build");

        assert_eq!(options.client_id(), "light_simulator_1");
        assert_eq!(
            options.broker_address(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
    }

    #[test]
    fn test_last_will_is_retained_on_base_topic() {
        let topics = LightTopics::new("/student_group").unwrap();
        let options =
            configure_mqtt_options("light_simulator_1", &test_mqtt_config(), &topics).unwrap();

        let will = options.last_will().expect("last will should be set");
        assert_eq!(will.topic, "/student_group/light_control");
        assert_eq!(&will.message[..], LAST_WILL_PAYLOAD.as_bytes());
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::ConnectionFailed("test".to_string().into()),
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::SubscriptionFailed("test".to_string().into()),
            MqttError::DisconnectFailed("test".to_string().into()),
            MqttError::InvalidBrokerUrl("test".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
