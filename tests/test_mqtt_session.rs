//! Lifecycle tests against the real rumqttc event loop
//!
//! A minimal in-process broker accepts one connection, answers CONNACK and
//! pushes a burst of packets in a single write, then records everything the
//! simulator sends back.

use light_sim::agent::{AgentLifecycle, DeviceAgent, ExitStatus};
use light_sim::config::MqttSection;
use light_sim::protocol::{LightTopics, STATUS_REQUEST};
use light_sim::transport::mqtt::{create_session, ReconnectConfig};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);
const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const DISCONNECT: u8 = 14;

/// QoS 0 PUBLISH; topic and payload must fit a one-byte remaining length
fn qos0_publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let remaining = 2 + topic.len() + payload.len();
    assert!(remaining < 128);

    let mut packet = vec![0x30, remaining as u8];
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Control packet types in order of arrival
fn packet_types(bytes: &[u8]) -> Vec<u8> {
    let mut types = Vec::new();
    let mut i = 0;
    while let Some(&header) = bytes.get(i) {
        i += 1;
        let mut remaining = 0usize;
        let mut shift = 0;
        loop {
            let Some(&byte) = bytes.get(i) else {
                return types;
            };
            i += 1;
            remaining |= usize::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        types.push(header >> 4);
        i += remaining;
    }
    types
}

/// Accept one client, send `burst` right after its CONNECT, and return all
/// bytes the client wrote until it closed the socket
async fn fake_broker(listener: TcpListener, burst: Vec<u8>) -> Vec<u8> {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];

    let n = socket.read(&mut buf).await.unwrap();
    received.extend_from_slice(&buf[..n]);
    socket.write_all(&burst).await.unwrap();

    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
    received
}

#[tokio::test]
async fn test_status_burst_keeps_loop_responsive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let topics = LightTopics::new("g").unwrap();

    // Far more requests than the client's request channel holds
    let mut burst = CONNACK_ACCEPTED.to_vec();
    for _ in 0..30 {
        burst.extend(qos0_publish(topics.request(), STATUS_REQUEST.as_bytes()));
    }
    let broker = tokio::spawn(fake_broker(listener, burst));

    let config = MqttSection {
        broker_url: format!("mqtt://127.0.0.1:{port}"),
        ..MqttSection::default()
    };
    let (transport, events) = create_session("light_simulator_burst", &config, &topics).unwrap();
    let agent = DeviceAgent::new(transport, topics.clone(), 5);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let lifecycle = AgentLifecycle::new(agent, events, ReconnectConfig::default(), shutdown_rx);

    let run = tokio::spawn(lifecycle.run());
    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown_tx.send(true).unwrap();

    let status = tokio::time::timeout(TEST_TIMEOUT, run)
        .await
        .expect("lifecycle should finish after a shutdown request")
        .unwrap();
    assert_eq!(status, ExitStatus::Shutdown);

    let received = tokio::time::timeout(TEST_TIMEOUT, broker)
        .await
        .expect("client should close the socket")
        .unwrap();
    let types = packet_types(&received);

    assert!(types.contains(&SUBSCRIBE));
    // Initial state, at least one STATUS reply, and the shutdown notice
    assert!(types.iter().filter(|&&t| t == PUBLISH).count() >= 3);
    assert_eq!(types.last(), Some(&DISCONNECT));
}

#[tokio::test]
async fn test_command_burst_keeps_loop_responsive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let topics = LightTopics::new("g").unwrap();

    let mut burst = CONNACK_ACCEPTED.to_vec();
    for i in 0..30 {
        let command: &[u8] = if i % 2 == 0 { b"ON" } else { b"OFF" };
        burst.extend(qos0_publish(topics.base(), command));
    }
    let broker = tokio::spawn(fake_broker(listener, burst));

    let config = MqttSection {
        broker_url: format!("mqtt://127.0.0.1:{port}"),
        ..MqttSection::default()
    };
    let (transport, events) = create_session("light_simulator_flip", &config, &topics).unwrap();
    let agent = DeviceAgent::new(transport, topics.clone(), 5);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let lifecycle = AgentLifecycle::new(agent, events, ReconnectConfig::default(), shutdown_rx);

    let run = tokio::spawn(lifecycle.run());
    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown_tx.send(true).unwrap();

    let status = tokio::time::timeout(TEST_TIMEOUT, run)
        .await
        .expect("lifecycle should finish after a shutdown request")
        .unwrap();
    assert_eq!(status, ExitStatus::Shutdown);

    let received = tokio::time::timeout(TEST_TIMEOUT, broker)
        .await
        .expect("client should close the socket")
        .unwrap();
    assert_eq!(packet_types(&received).last(), Some(&DISCONNECT));
}
