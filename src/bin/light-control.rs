//! Light Control - operator tool for the light simulator
//!
//! Switches the light, asks it for its state, or watches the state topic.
//!
//! ## Usage
//!
//! ```bash
//! # Switch the light on
//! light-control set on
//!
//! # Ask the light for its current state
//! light-control status --timeout-secs 3
//!
//! # Follow every state change until Ctrl-C
//! light-control --group /lab watch
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use light_sim::config::ConfigError;
use light_sim::error::{SimulatorError, SimulatorResult};
use light_sim::observability::init_default_logging;
use light_sim::protocol::{LightState, LightTopics, STATUS_REQUEST};
use light_sim::transport::mqtt::{configure_client_options, generate_client_id, MqttError};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS};
use std::process;
use tokio::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_BROKER_URL: &str = "mqtt://broker.emqx.io:1883";
const DEFAULT_GROUP: &str = "/student_group";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "light-control",
    about = "Send commands to a simulated light and observe its state",
    version
)]
struct Args {
    /// MQTT broker URL
    #[arg(long, env = "LIGHT_SIM_BROKER_URL", default_value = DEFAULT_BROKER_URL)]
    broker_url: String,

    /// Topic group of the light
    #[arg(long, env = "LIGHT_SIM_GROUP", default_value = DEFAULT_GROUP)]
    group: String,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Switch the light on or off
    Set {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Request the current state and print the reply
    Status {
        /// Seconds to wait for a reply
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
    /// Print every message on the light's state topic until Ctrl-C
    Watch,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for LightState {
    fn from(switch: Switch) -> Self {
        match switch {
            Switch::On => LightState::On,
            Switch::Off => LightState::Off,
        }
    }
}

/// One connected operator session
struct ControlSession {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: LightTopics,
}

impl ControlSession {
    async fn connect(broker_url: &str, topics: LightTopics) -> SimulatorResult<Self> {
        let client_id = generate_client_id("light_control");
        let options = configure_client_options(&client_id, broker_url, Duration::from_secs(60))?;
        let (client, mut eventloop) = AsyncClient::new(options, 10);

        info!("Connecting to MQTT broker {}...", broker_url);
        tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(event) => debug!(?event, "Event before CONNACK"),
                    Err(e) => return Err(connection_error(e)),
                }
            }
        })
        .await
        .map_err(|_| SimulatorError::timeout("no CONNACK from broker"))??;

        Ok(Self {
            client,
            eventloop,
            topics,
        })
    }

    /// Publish a command (not retained) and wait for the broker's PUBACK
    async fn set(&mut self, state: LightState) -> SimulatorResult<()> {
        self.client
            .publish(self.topics.base(), QoS::AtLeastOnce, false, state.as_str())
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        self.wait_for(|event| matches!(event, Event::Incoming(Packet::PubAck(_))))
            .await?;
        println!("Sent {} to {}", state, self.topics.base());
        Ok(())
    }

    /// Ask for the state and print the first valid state seen on the base topic
    async fn status(&mut self, timeout: Duration) -> SimulatorResult<()> {
        self.subscribe_base().await?;
        self.client
            .publish(
                self.topics.request(),
                QoS::AtLeastOnce,
                false,
                STATUS_REQUEST,
            )
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        let base = self.topics.base().to_string();
        let state = tokio::time::timeout(timeout, async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == base => {
                        let text = String::from_utf8_lossy(&publish.payload);
                        match text.trim().parse::<LightState>() {
                            Ok(state) => return Ok(state),
                            Err(_) => debug!(payload = %text, "Ignoring non-state payload"),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => return Err(connection_error(e)),
                }
            }
        })
        .await
        .map_err(|_| SimulatorError::timeout(format!("no state received within {timeout:?}")))??;

        println!("Light is {state}");
        Ok(())
    }

    /// Print state-topic traffic until Ctrl-C
    async fn watch(&mut self) -> SimulatorResult<()> {
        self.subscribe_base().await?;
        println!("Watching {} (Ctrl-C to stop)", self.topics.base());

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received...");
                    return Ok(());
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        println!(
                            "{}",
                            format_state_line(&publish.topic, &publish.payload, publish.retain)
                        );
                    }
                    Ok(_) => {}
                    Err(e) => return Err(connection_error(e)),
                }
            }
        }
    }

    async fn subscribe_base(&mut self) -> SimulatorResult<()> {
        self.client
            .subscribe(self.topics.base(), QoS::AtLeastOnce)
            .await
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;

        self.wait_for(|event| matches!(event, Event::Incoming(Packet::SubAck(_))))
            .await
    }

    /// Send DISCONNECT and drive the loop until it is written
    async fn close(mut self) -> SimulatorResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| MqttError::DisconnectFailed(Box::new(e)))?;

        self.wait_for(|event| matches!(event, Event::Outgoing(Outgoing::Disconnect)))
            .await
    }

    async fn wait_for(&mut self, done: impl Fn(&Event) -> bool) -> SimulatorResult<()> {
        let eventloop = &mut self.eventloop;
        tokio::time::timeout(FLUSH_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(event) if done(&event) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(connection_error(e)),
                }
            }
        })
        .await
        .map_err(|_| SimulatorError::timeout("broker did not acknowledge in time"))?
    }
}

fn connection_error(e: ConnectionError) -> SimulatorError {
    MqttError::ConnectionFailed(Box::new(e)).into()
}

/// One line per observed message, timestamped
fn format_state_line(topic: &str, payload: &[u8], retained: bool) -> String {
    let timestamp = chrono::Utc::now().format("%H:%M:%S");
    let marker = if retained { " (retained)" } else { "" };
    format!(
        "{timestamp} {topic} {}{marker}",
        String::from_utf8_lossy(payload).trim()
    )
}

async fn run(args: Args) -> SimulatorResult<()> {
    let topics = LightTopics::new(&args.group)
        .map_err(ConfigError::InvalidGroup)?;
    let mut session = ControlSession::connect(&args.broker_url, topics).await?;

    match args.command {
        Command::Set { state } => session.set(state.into()).await?,
        Command::Status { timeout_secs } => {
            session.status(Duration::from_secs(timeout_secs)).await?
        }
        Command::Watch => session.watch().await?,
    }

    session.close().await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_default_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!("{}", e);
        process::exit(1);
    }
}
