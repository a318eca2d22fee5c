//! Pure routing of rumqttc events
//!
//! Maps raw MQTT 3.1.1 events and errors onto [`TransportEvent`]s so the
//! agent never sees rumqttc types.

use crate::transport::TransportEvent;
use rumqttc::{ConnectReturnCode, ConnectionError, Event, Outgoing, Packet};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to the corresponding transport event (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> TransportEvent {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => match Self::connect_code(&connack.code) {
                    0 => TransportEvent::Connected,
                    code => TransportEvent::ConnectRefused(code),
                },
                Packet::Publish(publish) => TransportEvent::Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                },
                Packet::SubAck(_) => TransportEvent::Subscribed,
                Packet::Disconnect => {
                    TransportEvent::ConnectionLost("Broker disconnected".to_string())
                }
                _ => TransportEvent::Idle,
            },
            Event::Outgoing(Outgoing::Disconnect) => TransportEvent::Disconnected,
            Event::Outgoing(_) => TransportEvent::Idle,
        }
    }

    /// Numeric CONNACK return code
    pub fn connect_code(code: &ConnectReturnCode) -> u8 {
        match code {
            ConnectReturnCode::Success => 0,
            ConnectReturnCode::RefusedProtocolVersion => 1,
            ConnectReturnCode::BadClientId => 2,
            ConnectReturnCode::ServiceUnavailable => 3,
            ConnectReturnCode::BadUserNamePassword => 4,
            ConnectReturnCode::NotAuthorized => 5,
        }
    }

    /// A refused CONNACK surfaces from rumqttc as an error; recover its code
    pub fn refused_code(error: &ConnectionError) -> Option<u8> {
        match error {
            ConnectionError::ConnectionRefused(code) => Some(Self::connect_code(code)),
            _ => None,
        }
    }
}
