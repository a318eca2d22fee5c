//! Mock implementations for testing
//!
//! [`MockTransport`] records every outbound request; [`ScriptedEvents`]
//! replays a fixed sequence of inbound events. Together they drive the
//! agent and the lifecycle loop without a broker.

use crate::transport::mqtt::MqttError;
use crate::transport::{EventSource, Transport, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One recorded publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Mock transport for testing
///
/// Clones share the same history, so a test can keep a handle after moving
/// one into the agent.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub subscriptions: Arc<Mutex<Vec<Vec<String>>>>,
    pub disconnects: Arc<AtomicUsize>,
    pub should_fail: bool,
    disconnect_requested: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Event source that replays `script` and reports `Disconnected` once
    /// this transport has been asked to disconnect
    pub fn scripted_events(
        &self,
        script: impl IntoIterator<Item = Result<TransportEvent, MqttError>>,
    ) -> ScriptedEvents {
        ScriptedEvents {
            script: script.into_iter().collect(),
            disconnect_requested: self.disconnect_requested.clone(),
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    /// Payloads of all publishes, as text, in order
    pub async fn get_published_payloads(&self) -> Vec<String> {
        self.published_messages
            .lock()
            .await
            .iter()
            .map(PublishedMessage::payload_str)
            .collect()
    }

    pub async fn get_subscriptions(&self) -> Vec<Vec<String>> {
        self.subscriptions.lock().await.clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
        self.subscriptions.lock().await.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn subscribe(&self, topics: &[String]) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MqttError::SubscriptionFailed(
                "Mock subscribe failure".into(),
            ));
        }

        self.subscriptions.lock().await.push(topics.to_vec());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }

        self.published_messages.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MqttError::DisconnectFailed("Mock disconnect failure".into()));
        }

        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.disconnect_requested.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted inbound event stream
///
/// Once the script is exhausted `next_event` never resolves, like an idle
/// broker connection.
#[derive(Debug)]
pub struct ScriptedEvents {
    script: VecDeque<Result<TransportEvent, MqttError>>,
    disconnect_requested: Arc<AtomicBool>,
    polls: Arc<AtomicUsize>,
}

impl ScriptedEvents {
    /// Shared poll counter, readable after the source has been moved
    pub fn poll_counter(&self) -> Arc<AtomicUsize> {
        self.polls.clone()
    }

    /// Convenience constructor for an inbound message event
    pub fn message(topic: &str, payload: &str) -> Result<TransportEvent, MqttError> {
        Ok(TransportEvent::Message {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload.as_bytes()),
        })
    }

    /// Convenience constructor for a network failure
    pub fn network_error(reason: &str) -> Result<TransportEvent, MqttError> {
        Err(MqttError::ConnectionFailed(reason.to_string().into()))
    }
}

#[async_trait]
impl EventSource for ScriptedEvents {
    type Error = MqttError;

    async fn next_event(&mut self) -> Result<TransportEvent, Self::Error> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        if self.disconnect_requested.swap(false, Ordering::SeqCst) {
            return Ok(TransportEvent::Disconnected);
        }

        match self.script.pop_front() {
            Some(next) => next,
            None => std::future::pending().await,
        }
    }
}
