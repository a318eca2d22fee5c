//! Light Simulator - MQTT-controlled light fixture
//!
//! Simulates a single light that is switched by text commands over MQTT and
//! reports its state back as a retained message.
//!
//! # Overview
//!
//! - Topic layout and payload literals ([`protocol`])
//! - MQTT transport with at-least-once delivery and a last will ([`transport`])
//! - The light state machine and its event loop ([`agent`])
//! - TOML configuration with built-in defaults ([`config`])
//!
//! # Quick Start
//!
//! ```rust
//! use light_sim::protocol::{LightState, LightTopics};
//!
//! let topics = LightTopics::new("/student_group").unwrap();
//! assert_eq!(topics.base(), "/student_group/light_control");
//! assert_eq!(topics.request(), "/student_group/light_control/request");
//!
//! let requested: LightState = "ON".parse().unwrap();
//! assert_eq!(requested.to_string(), "ON");
//! assert!("on".parse::<LightState>().is_err());
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use agent::{AgentLifecycle, DeviceAgent, ExitStatus, Flow};
pub use config::*;
pub use error::{SimulatorError, SimulatorResult};
pub use protocol::*;
pub use transport::mqtt::MqttClient;
