//! Transport layer for the light simulator
//!
//! Splits the pub/sub session into two seams: [`Transport`] for outbound
//! requests issued by the agent, and [`EventSource`] for the inbound event
//! stream the lifecycle loop drives. Both are implemented over rumqttc in
//! [`mqtt`] and by mocks in [`crate::testing`].

use bytes::Bytes;

pub mod mqtt;

/// Outbound half of a pub/sub session
///
/// Every publish and subscribe uses at-least-once delivery.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Subscribe to all topics in a single request
    async fn subscribe(&self, topics: &[String]) -> Result<(), Self::Error>;

    /// Publish a payload to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool)
    -> Result<(), Self::Error>;

    /// Request a clean session close (suppresses the last will)
    async fn disconnect(&self) -> Result<(), Self::Error>;
}

/// Events surfaced by the transport to the agent loop
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker accepted the session
    Connected,
    /// Broker refused the session with a CONNACK return code (1..=5)
    ConnectRefused(u8),
    /// Message received on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Subscription acknowledged
    Subscribed,
    /// Established session lost without a clean close
    ConnectionLost(String),
    /// Our own DISCONNECT was written to the network
    Disconnected,
    /// Keep-alive and acknowledgement traffic
    Idle,
}

/// Inbound half of a pub/sub session
#[async_trait::async_trait]
pub trait EventSource: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Drive the session until the next event
    ///
    /// An `Err` means the network connection could not be established or
    /// was dropped; calling again attempts a fresh connection.
    async fn next_event(&mut self) -> Result<TransportEvent, Self::Error>;
}
