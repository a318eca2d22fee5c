//! MQTT 3.1.1 transport over rumqttc
//!
//! - [`connection`] - pure option building, URL parsing and reconnection delays
//! - [`message_handler`] - pure mapping of rumqttc events to [`TransportEvent`](crate::transport::TransportEvent)
//! - [`client`] - impure I/O: the request handle and the event loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use light_sim::config::MqttSection;
//! use light_sim::protocol::LightTopics;
//! use light_sim::transport::mqtt::create_session;
//! use light_sim::transport::{EventSource, Transport};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let topics = LightTopics::new("/student_group")?;
//! let (client, mut events) = create_session("light_simulator_1", &MqttSection::default(), &topics)?;
//! client.subscribe(&topics.subscriptions()).await?;
//! let _first = events.next_event().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{create_session, MqttClient, MqttEventLoop};
pub use connection::{
    configure_client_options, configure_mqtt_options, generate_client_id, parse_broker_url,
    BrokerAddress, ConnectionState, MqttError, ReconnectConfig,
};
pub use message_handler::MessageHandler;
