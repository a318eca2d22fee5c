//! Impure I/O operations for the MQTT session
//!
//! Wraps the rumqttc request handle ([`MqttClient`]) and its event loop
//! ([`MqttEventLoop`]). The event loop reconnects on the next poll after an
//! error; the delay between polls is the lifecycle's job.
//!
//! Both halves are driven from the same task, so requests are queued with
//! the non-blocking `try_*` calls. A full request channel fails the request
//! instead of waiting for a poll that can never happen.

use super::connection::{configure_mqtt_options, MqttError};
use super::message_handler::MessageHandler;
use crate::config::MqttSection;
use crate::protocol::LightTopics;
use crate::transport::{EventSource, Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS, SubscribeFilter};
use tracing::debug;

/// Capacity of the request channel between the client handle and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Build a session: the outbound client handle and its event loop
///
/// No network I/O happens here; the connection is opened on the first poll.
pub fn create_session(
    client_id: &str,
    config: &MqttSection,
    topics: &LightTopics,
) -> Result<(MqttClient, MqttEventLoop), MqttError> {
    let mqtt_options = configure_mqtt_options(client_id, config, topics)?;
    let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

    Ok((
        MqttClient {
            client,
            client_id: client_id.to_string(),
        },
        MqttEventLoop { event_loop },
    ))
}

/// Outbound MQTT request handle
#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    client_id: String,
}

impl MqttClient {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn subscribe(&self, topics: &[String]) -> Result<(), Self::Error> {
        let filters = topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtLeastOnce));

        self.client
            .try_subscribe_many(filters)
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;

        debug!(target: "mqtt_transport", topics = ?topics, "Subscribe request queued");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        self.client
            .try_disconnect()
            .map_err(|e| MqttError::DisconnectFailed(Box::new(e)))
    }
}

/// Inbound MQTT event stream
pub struct MqttEventLoop {
    event_loop: EventLoop,
}

#[async_trait]
impl EventSource for MqttEventLoop {
    type Error = MqttError;

    async fn next_event(&mut self) -> Result<TransportEvent, Self::Error> {
        match self.event_loop.poll().await {
            Ok(event) => {
                let route = MessageHandler::route_mqtt_event(&event);
                if route == TransportEvent::Idle {
                    tracing::trace!(target: "mqtt_transport", "MQTT event: {:?}", event);
                }
                Ok(route)
            }
            Err(e) => match MessageHandler::refused_code(&e) {
                Some(code) => Ok(TransportEvent::ConnectRefused(code)),
                None => Err(MqttError::ConnectionFailed(Box::new(e))),
            },
        }
    }
}
