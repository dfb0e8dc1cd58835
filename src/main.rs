//! Observable customer service agent - main entry point

use clap::{Parser, Subcommand};
use observable_agent::agent::Agent;
use observable_agent::config::{AgentConfig, ServerConfig};
use observable_agent::observability::{init_default_logging, MetricsRegistry, StructuredLogger};
use observable_agent::server::{self, AppState};
use observable_agent::tools::builtin::SimulatedOrderLookup;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Customer service voice agent with structured logs, metrics and health endpoints
#[derive(Parser)]
#[command(name = "observable-agent")]
#[command(version)]
struct Cli {
    /// Agent configuration file (TOML); the built-in default is used when absent
    #[arg(short, long, value_name = "FILE", env = "AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host, overrides HOST
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides PORT
    #[arg(long)]
    port: Option<u16>,

    /// Metrics port, overrides METRICS_PORT
    #[arg(long)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the agent
    Run,
    /// Validate the agent configuration
    Config {
        /// Print the resolved configuration as TOML
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match AgentConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let mut server_config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    if let Some(port) = cli.port {
        server_config.port = port;
    }
    if let Some(metrics_port) = cli.metrics_port {
        server_config.metrics_port = metrics_port;
    }

    let result = match cli.command {
        Commands::Run => run_agent(config, server_config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run_agent(
    config: AgentConfig,
    server_config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        agent = %config.agent.name,
        version = %server_config.version,
        "Starting observable agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    let metrics = MetricsRegistry::start(&config.agent.name, server_config.metrics_enabled);
    let agent = Arc::new(Agent::new(config, StructuredLogger::stderr(), metrics));

    // The process keeps serving when initialization fails; /ready reports it.
    if let Err(e) = agent.initialize(Arc::new(SimulatedOrderLookup::default())) {
        warn!("Agent not ready: {}", e.sanitized());
    }

    let state = Arc::new(AppState::new(agent, &server_config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Application shutdown initiated");
        let _ = shutdown_tx.send(true);
    });

    server::serve(&server_config, state, shutdown_rx).await?;

    info!("Application shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl-C, shutting down gracefully...");
    }
}

fn handle_config_command(config: &AgentConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", config.to_toml()?);
    }

    info!(agent = %config.agent.name, "Configuration validation complete");
    Ok(())
}
