//! Light fixture state machine
//!
//! [`DeviceAgent`] owns the light state, the connection state and the
//! reconnect counter, and exposes one handler per transport event. Handlers
//! are invoked one at a time from the lifecycle loop, so no locking is needed.
//! Every failure inside a handler is logged and swallowed.

use crate::protocol::{
    describe_connect_code, LightState, LightTopics, SHUTDOWN_NOTICE, STATUS_REQUEST,
};
use crate::transport::mqtt::ConnectionState;
use crate::transport::Transport;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// What the loop should do after a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Reconnect ceiling reached; run the shutdown procedure
    Shutdown,
}

/// Failures while handling an inbound message
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("payload is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),
}

/// The simulated light, driven by transport events
pub struct DeviceAgent<T>
where
    T: Transport,
{
    transport: T,
    topics: LightTopics,
    light: LightState,
    connection: ConnectionState,
    reconnect_count: u32,
    max_reconnects: u32,
}

impl<T> DeviceAgent<T>
where
    T: Transport,
{
    pub fn new(transport: T, topics: LightTopics, max_reconnects: u32) -> Self {
        Self {
            transport,
            topics,
            light: LightState::default(),
            connection: ConnectionState::Disconnected,
            reconnect_count: 0,
            max_reconnects,
        }
    }

    pub fn light_state(&self) -> LightState {
        self.light
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    pub fn max_reconnects(&self) -> u32 {
        self.max_reconnects
    }

    pub fn topics(&self) -> &LightTopics {
        &self.topics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn ceiling_reached(&self) -> bool {
        self.reconnect_count >= self.max_reconnects
    }

    /// A connection attempt has started
    pub fn on_connecting(&mut self) {
        if self.connection != ConnectionState::Connected {
            self.connection = ConnectionState::Connecting;
        }
    }

    /// CONNACK received (or refused) with the given return code
    pub async fn on_connect(&mut self, code: u8) -> Flow {
        if code != 0 {
            self.connection = ConnectionState::Disconnected;
            error!(
                code,
                reason = describe_connect_code(code),
                "Connection failed with code {}: {}",
                code,
                describe_connect_code(code)
            );
            if self.ceiling_reached() {
                error!("Maximum reconnection attempts reached. Exiting...");
                return Flow::Shutdown;
            }
            return Flow::Continue;
        }

        self.connection = ConnectionState::Connected;
        self.reconnect_count = 0;
        info!("Connected to MQTT broker successfully");

        let subscriptions = self.topics.subscriptions();
        match self.transport.subscribe(&subscriptions).await {
            Ok(()) => info!(
                base = self.topics.base(),
                request = self.topics.request(),
                "Subscribed to topics"
            ),
            Err(e) => error!(error = %e, "Failed to subscribe to light topics"),
        }

        // Retained, so late subscribers see the state without asking
        self.publish_state().await;
        Flow::Continue
    }

    /// Session ended; code 0 means we closed it ourselves
    pub async fn on_disconnect(&mut self, code: u8) -> Flow {
        self.connection = ConnectionState::Disconnected;

        if code == 0 {
            info!("Disconnected successfully");
            return Flow::Continue;
        }

        self.reconnect_count += 1;
        warn!(
            attempt = self.reconnect_count,
            max_attempts = self.max_reconnects,
            "Unexpected disconnection ({}/{}). Attempting to reconnect...",
            self.reconnect_count,
            self.max_reconnects
        );

        if self.ceiling_reached() {
            error!("Maximum reconnection attempts reached. Exiting...");
            return Flow::Shutdown;
        }
        Flow::Continue
    }

    /// Inbound message on one of the subscribed topics
    pub async fn on_message(&mut self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.handle_message(topic, payload).await {
            error!(topic, error = %e, "Error processing message");
        }
    }

    async fn handle_message(&mut self, topic: &str, payload: &[u8]) -> Result<(), MessageError> {
        let text = std::str::from_utf8(payload)?.trim();
        debug!(topic, payload = text, "Message received");

        if topic == self.topics.request() && text == STATUS_REQUEST {
            self.publish_state().await;
            return Ok(());
        }

        if topic == self.topics.base() {
            match text.parse::<LightState>() {
                Ok(requested) if requested != self.light => {
                    self.light = requested;
                    info!(state = %self.light, "Light is TURNED {}", self.light);
                    self.publish_state().await;
                }
                Ok(_) => {}
                // Our own retained notices echo back here as well
                Err(_) => warn!(payload = text, "Invalid command received: {}", text),
            }
        }

        Ok(())
    }

    /// Publish the current state, retained; a no-op while not connected
    pub async fn publish_state(&self) {
        if self.connection != ConnectionState::Connected {
            debug!(state = %self.light, "Not connected, state not published");
            return;
        }

        let payload = self.light.as_str().as_bytes().to_vec();
        match self.transport.publish(self.topics.base(), payload, true).await {
            Ok(()) => info!(state = %self.light, "Published state: {}", self.light),
            Err(e) => error!(error = %e, "Failed to publish state"),
        }
    }

    /// Graceful shutdown: announce and close the session if connected
    ///
    /// Returns `true` when a clean DISCONNECT was requested, so the caller
    /// knows to keep the event loop running until it is flushed.
    pub async fn shutdown(&mut self) -> bool {
        info!("Shutting down...");

        if self.connection != ConnectionState::Connected {
            return false;
        }

        let notice = SHUTDOWN_NOTICE.as_bytes().to_vec();
        if let Err(e) = self.transport.publish(self.topics.base(), notice, true).await {
            error!(error = %e, "Failed to publish shutdown notice");
        }

        match self.transport.disconnect().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to request clean disconnect");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockTransport;

    fn agent() -> (DeviceAgent<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let topics = LightTopics::new("/student_group").unwrap();
        (DeviceAgent::new(transport.clone(), topics, 5), transport)
    }

    #[test]
    fn test_initial_state() {
        let (agent, _) = agent();
        assert_eq!(agent.light_state(), LightState::Off);
        assert_eq!(agent.connection_state(), ConnectionState::Disconnected);
        assert_eq!(agent.reconnect_count(), 0);
        assert_eq!(agent.max_reconnects(), 5);
    }

    #[test]
    fn test_on_connecting_does_not_downgrade_connected() {
        let (mut agent, _) = agent();
        agent.on_connecting();
        assert_eq!(agent.connection_state(), ConnectionState::Connecting);

        agent.connection = ConnectionState::Connected;
        agent.on_connecting();
        assert_eq!(agent.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_subscribes_in_one_batch_then_publishes() {
        let (mut agent, transport) = agent();

        assert_eq!(agent.on_connect(0).await, Flow::Continue);

        assert_eq!(agent.connection_state(), ConnectionState::Connected);
        assert_eq!(
            transport.get_subscriptions().await,
            vec![vec![
                "/student_group/light_control".to_string(),
                "/student_group/light_control/request".to_string(),
            ]]
        );

        let published = transport.get_published_messages().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "/student_group/light_control");
        assert_eq!(published[0].payload_str(), "OFF");
        assert!(published[0].retain);
    }

    #[tokio::test]
    async fn test_refused_connect_below_ceiling_continues() {
        let (mut agent, transport) = agent();
        agent.reconnect_count = 4;

        assert_eq!(agent.on_connect(3).await, Flow::Continue);
        assert_eq!(agent.connection_state(), ConnectionState::Disconnected);
        // Refused connects never touch the counter
        assert_eq!(agent.reconnect_count(), 4);
        assert!(transport.get_subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_refused_connect_at_ceiling_requests_shutdown() {
        let (mut agent, _) = agent();
        agent.reconnect_count = 5;

        assert_eq!(agent.on_connect(5).await, Flow::Shutdown);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_swallowed() {
        let (mut agent, transport) = agent();
        agent.on_connect(0).await;
        transport.clear_history().await;

        agent
            .on_message("/student_group/light_control", &[0xff, 0xfe, 0x4f])
            .await;

        assert_eq!(agent.light_state(), LightState::Off);
        assert!(transport.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_command_payload_is_trimmed() {
        let (mut agent, transport) = agent();
        agent.on_connect(0).await;
        transport.clear_history().await;

        agent
            .on_message("/student_group/light_control", b"  ON\r\n")
            .await;

        assert_eq!(agent.light_state(), LightState::On);
        assert_eq!(transport.get_published_payloads().await, vec!["ON"]);
    }

    #[tokio::test]
    async fn test_state_change_while_disconnected_is_not_published() {
        let (mut agent, transport) = agent();

        agent.on_message("/student_group/light_control", b"ON").await;

        assert_eq!(agent.light_state(), LightState::On);
        assert!(transport.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_logged_not_propagated() {
        let transport = MockTransport::with_failure();
        let topics = LightTopics::new("/student_group").unwrap();
        let mut agent = DeviceAgent::new(transport, topics, 5);

        assert_eq!(agent.on_connect(0).await, Flow::Continue);
        agent.on_message("/student_group/light_control", b"ON").await;
        assert_eq!(agent.light_state(), LightState::On);
    }

    #[tokio::test]
    async fn test_shutdown_when_disconnected_publishes_nothing() {
        let (mut agent, transport) = agent();

        assert!(!agent.shutdown().await);
        assert!(transport.get_published_messages().await.is_empty());
        assert_eq!(transport.disconnect_count(), 0);
    }
}
