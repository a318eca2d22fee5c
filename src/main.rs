//! Light Simulator - Main Entry Point
//!
//! Connects a simulated light to an MQTT broker and serves ON/OFF commands
//! until a termination signal arrives or the reconnect ceiling is reached.

use clap::{Parser, Subcommand};
use light_sim::agent::{listen_for_termination, AgentLifecycle, DeviceAgent, ExitStatus};
use light_sim::config::{SimulatorConfig, DEFAULT_CONFIG_PATHS};
use light_sim::error::SimulatorResult;
use light_sim::observability::{init_default_logging, mqtt_span};
use light_sim::transport::mqtt::{create_session, generate_client_id};
use std::path::{Path, PathBuf};
use std::process;
use tokio::sync::watch;
use tracing::{error, info, Instrument};

/// MQTT-controlled light simulator
#[derive(Parser)]
#[command(name = "light-sim")]
#[command(about = "Simulated light fixture controlled over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker URL, overriding the configuration file
    #[arg(long, env = "LIGHT_SIM_BROKER_URL")]
    broker_url: Option<String>,

    /// Topic group, overriding the configuration file
    #[arg(long, env = "LIGHT_SIM_GROUP")]
    group: Option<String>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulated light (default)
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let code = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_simulator(config).await,
        Commands::Config { show } => match handle_config_command(&config, show) {
            Ok(()) => 0,
            Err(e) => {
                error!("Command failed: {}", e);
                1
            }
        },
    };

    process::exit(code);
}

/// Resolve the configuration file, apply CLI overrides, then validate
fn load_configuration(cli: &Cli) -> SimulatorResult<SimulatorConfig> {
    let mut config = match find_config_file(cli.config.as_deref()) {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            SimulatorConfig::load_from_file(&path)?
        }
        None => {
            info!("No configuration file found, using built-in defaults");
            SimulatorConfig::default()
        }
    };

    if let Some(broker_url) = &cli.broker_url {
        config.mqtt.broker_url = broker_url.clone();
    }
    if let Some(group) = &cli.group {
        config.device.group = group.clone();
    }

    config.validate()?;
    Ok(config)
}

fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

async fn run_simulator(config: SimulatorConfig) -> i32 {
    match start_simulator(config).await {
        Ok(status) => {
            info!("Light simulator stopped");
            status.code()
        }
        Err(e) => {
            error!("Failed to start light simulator: {}", e);
            ExitStatus::ConnectFailed.code()
        }
    }
}

async fn start_simulator(config: SimulatorConfig) -> SimulatorResult<ExitStatus> {
    let topics = config.topics()?;
    let client_id = generate_client_id(&config.device.client_id_prefix);

    info!("Starting light simulator v{}", env!("CARGO_PKG_VERSION"));
    info!("Connecting to MQTT broker at {}", config.mqtt.broker_url);
    info!("Light control topic: {}", topics.base());
    info!("Status request topic: {}", topics.request());

    let (transport, events) = create_session(&client_id, &config.mqtt, &topics)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = listen_for_termination(shutdown_tx);

    let agent = DeviceAgent::new(transport, topics, config.mqtt.max_reconnect_attempts);
    let lifecycle = AgentLifecycle::new(
        agent,
        events,
        config.mqtt.reconnect.to_reconnect_config(),
        shutdown_rx,
    );

    let status = lifecycle
        .run()
        .instrument(mqtt_span!(client_id = %client_id))
        .await;

    signals.abort();
    Ok(status)
}

fn handle_config_command(config: &SimulatorConfig, show: bool) -> Result<(), toml::ser::Error> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
