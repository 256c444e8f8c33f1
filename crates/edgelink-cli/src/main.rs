//! edgelink CLI — user-facing binary for the edgelink pointer-sharing agent.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgelink_agent::{Agent, AgentConfig, AgentEvent};
use edgelink_discovery::{DiscoveryTransport, UdpBroadcast};
use edgelink_input::{NoopSink, NullSource};

#[derive(Parser)]
#[command(
    name = "edgelink",
    about = "Share one pointer across adjacent machines",
    version,
    propagate_version = true
)]
struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the edgelink agent.
    Start {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured node name.
        #[arg(long)]
        name: Option<String>,

        /// Override the configured control port.
        #[arg(long)]
        control_port: Option<u16>,

        /// Override the configured discovery port.
        #[arg(long)]
        discovery_port: Option<u16>,
    },

    /// Listen for peer announcements and print what is heard.
    Discover {
        /// Discovery port to listen on.
        #[arg(long, default_value_t = 24801)]
        port: u16,

        /// How long to listen, in seconds.
        #[arg(long, default_value_t = 3)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            name,
            control_port,
            discovery_port,
        } => {
            // Loaded before logging init so the configured filter can
            // shape it; RUST_LOG and --verbose still win.
            let mut config = AgentConfig::load(config.as_deref())?;
            if let Some(name) = name {
                config.agent.node_name = name;
            }
            if let Some(port) = control_port {
                config.agent.control_port = port;
            }
            if let Some(port) = discovery_port {
                config.agent.discovery_port = port;
            }
            init_logging(cli.verbose, config.agent.log_filter.as_deref());
            run_agent(config).await
        }
        Commands::Discover { port, seconds } => {
            init_logging(cli.verbose, None);
            discover(port, seconds).await
        }
    }
}

fn init_logging(verbose: bool, config_filter: Option<&str>) {
    let default_filter = if verbose {
        "debug"
    } else {
        config_filter.unwrap_or("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    let mut agent = Agent::bind(config, Box::new(NoopSink::new()), Box::new(NullSource::new()))
        .await
        .context("failed to start agent")?;

    let events = agent.event_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = events.send(AgentEvent::Shutdown).await;
        }
    });

    agent.run().await?;
    Ok(())
}

async fn discover(port: u16, seconds: u64) -> anyhow::Result<()> {
    let transport = UdpBroadcast::bind(port)
        .await
        .context("failed to bind discovery socket")?;
    println!("listening for peers on UDP port {port} for {seconds}s");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut seen = HashSet::new();
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, transport.recv()).await {
            Ok(Ok((announcement, from))) => {
                if seen.insert(announcement.node_name.clone()) {
                    println!(
                        "{} at {}:{}",
                        announcement.node_name,
                        from.ip(),
                        announcement.control_port
                    );
                }
            }
            Ok(Err(e)) => return Err(e).context("discovery receive failed"),
            Err(_) => break,
        }
    }

    if seen.is_empty() {
        println!("no peers heard");
    }
    Ok(())
}
