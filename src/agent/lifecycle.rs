//! Light simulator lifecycle management
//!
//! Drives a [`DeviceAgent`] from an [`EventSource`] on a single task:
//! the first connection attempt, reconnection backoff, and the graceful
//! shutdown triggered either by a termination signal or by the agent's
//! reconnect ceiling.

use super::device::{DeviceAgent, Flow};
use crate::transport::mqtt::{ConnectionState, ReconnectConfig};
use crate::transport::{EventSource, Transport, TransportEvent};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Upper bound on flushing the shutdown notice and DISCONNECT
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How the simulator ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Signal or reconnect ceiling; shutdown procedure ran
    Shutdown,
    /// The very first connection attempt failed at the network level
    ConnectFailed,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Shutdown => 0,
            ExitStatus::ConnectFailed => 1,
        }
    }
}

enum Step<E> {
    ShutdownRequested,
    Event(Result<TransportEvent, E>),
}

/// Event loop owning the agent and its inbound event stream
pub struct AgentLifecycle<T, E>
where
    T: Transport,
    E: EventSource,
{
    agent: DeviceAgent<T>,
    events: E,
    reconnect: ReconnectConfig,
    shutdown_rx: watch::Receiver<bool>,
    failed_polls: u32,
    handshake_seen: bool,
}

impl<T, E> AgentLifecycle<T, E>
where
    T: Transport,
    E: EventSource,
{
    pub fn new(
        agent: DeviceAgent<T>,
        events: E,
        reconnect: ReconnectConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            agent,
            events,
            reconnect,
            shutdown_rx,
            failed_polls: 0,
            handshake_seen: false,
        }
    }

    pub fn agent(&self) -> &DeviceAgent<T> {
        &self.agent
    }

    /// Run until shutdown; returns how the process should exit
    pub async fn run(mut self) -> ExitStatus {
        let status = self.run_loop().await;
        if status == ExitStatus::Shutdown {
            self.shutdown()
                .instrument(crate::lifecycle_span!(phase = "shutdown"))
                .await;
        }
        status
    }

    async fn run_loop(&mut self) -> ExitStatus {
        self.agent.on_connecting();

        loop {
            let step = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown_rx) => Step::ShutdownRequested,
                result = self.events.next_event() => Step::Event(result),
            };

            let event = match step {
                Step::ShutdownRequested => {
                    info!("Termination requested");
                    return ExitStatus::Shutdown;
                }
                Step::Event(Ok(event)) => event,
                Step::Event(Err(e)) => {
                    if !self.handshake_seen {
                        error!(error = %e, "Failed to connect to broker");
                        return ExitStatus::ConnectFailed;
                    }
                    if self.handle_network_error(&e).await == Flow::Shutdown {
                        return ExitStatus::Shutdown;
                    }
                    if !self.backoff().await {
                        return ExitStatus::Shutdown;
                    }
                    continue;
                }
            };

            match event {
                TransportEvent::Connected => {
                    self.handshake_seen = true;
                    self.failed_polls = 0;
                    if self.agent.on_connect(0).await == Flow::Shutdown {
                        return ExitStatus::Shutdown;
                    }
                }
                TransportEvent::ConnectRefused(code) => {
                    self.handshake_seen = true;
                    if self.agent.on_connect(code).await == Flow::Shutdown {
                        return ExitStatus::Shutdown;
                    }
                    // The broker closes the socket after a refused CONNACK
                    if self.agent.on_disconnect(code).await == Flow::Shutdown {
                        return ExitStatus::Shutdown;
                    }
                    if !self.backoff().await {
                        return ExitStatus::Shutdown;
                    }
                }
                TransportEvent::Message { topic, payload } => {
                    self.agent.on_message(&topic, &payload).await;
                }
                TransportEvent::Subscribed => info!("Subscription confirmed"),
                TransportEvent::ConnectionLost(reason) => {
                    warn!(reason = %reason, "Connection lost");
                    if self.agent.connection_state() == ConnectionState::Connected
                        && self.agent.on_disconnect(1).await == Flow::Shutdown
                    {
                        return ExitStatus::Shutdown;
                    }
                }
                TransportEvent::Disconnected => {
                    self.agent.on_disconnect(0).await;
                }
                TransportEvent::Idle => {}
            }
        }
    }

    /// A poll failed after the first handshake
    async fn handle_network_error(&mut self, error: &E::Error) -> Flow {
        if self.agent.connection_state() == ConnectionState::Connected {
            warn!(error = %error, "MQTT connection dropped");
            self.agent.on_disconnect(1).await
        } else {
            warn!(error = %error, "Reconnection attempt failed");
            Flow::Continue
        }
    }

    /// Wait before the next connection attempt
    ///
    /// Returns `false` if shutdown was requested while waiting.
    async fn backoff(&mut self) -> bool {
        self.failed_polls += 1;
        let delay = self.reconnect.backoff_duration(self.failed_polls);
        info!(
            attempt = self.failed_polls,
            delay_ms = millis(delay),
            "Reconnecting after {:?}",
            delay
        );

        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown_rx) => {
                info!("Termination requested during reconnection delay");
                return false;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        self.agent.on_connecting();
        true
    }

    /// Shutdown procedure, run on the loop task
    async fn shutdown(&mut self) {
        if !self.agent.shutdown().await {
            return;
        }

        // Keep polling so the notice and DISCONNECT reach the broker
        let flushed = tokio::time::timeout(SHUTDOWN_GRACE, async {
            loop {
                match self.events.next_event().await {
                    Ok(TransportEvent::Disconnected) => return true,
                    Ok(event) => debug!(?event, "Event while shutting down"),
                    Err(e) => {
                        warn!(error = %e, "Connection closed before clean disconnect");
                        return false;
                    }
                }
            }
        })
        .await;

        match flushed {
            Ok(true) => {
                self.agent.on_disconnect(0).await;
            }
            Ok(false) => {}
            Err(_) => warn!("Clean disconnect not confirmed within {:?}", SHUTDOWN_GRACE),
        }
    }
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves once shutdown has been requested on the channel
///
/// Never resolves if every sender is gone without requesting it.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let requested = rx.wait_for(|requested| *requested).await.map(|_| ());
    if requested.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Listen for termination signals and flip the shutdown flag
///
/// The handler only signals the loop; the loop runs the shutdown itself.
pub fn listen_for_termination(shutdown_tx: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_termination_signal().await;
        let _ = shutdown_tx.send(true);
    })
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Failed to install signal handlers, falling back to Ctrl-C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down gracefully..."),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
