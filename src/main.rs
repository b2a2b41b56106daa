//! Beacon node binary
//!
//! Loads configuration, sets up logging and runs one node until Ctrl+C.

mod cli;

use clap::Parser;
use tracing::info;

use beacon_mesh::config::{self, NodeConfig};
use beacon_mesh::error::{Error, Result};
use beacon_mesh::transport::parse_peer_list;
use beacon_mesh::{logging, Node};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    let (config_path, address, peers, heartbeat_ms) = match cli.command {
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand);
        }
        Commands::Run {
            config,
            address,
            peers,
            heartbeat_ms,
        } => (config, address, peers, heartbeat_ms),
    };

    let config = match load_run_config(config_path.as_deref(), address, peers, heartbeat_ms) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(e),
    };

    // Held until exit so the file writer flushes
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        node = %config.display_name(),
        address = config.node.address,
        "Starting beacon node"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(1, 4))
        .thread_name("beacon-node")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    match runtime.block_on(Node::new(&config).run()) {
        Ok(stats) => {
            info!(
                heartbeats = stats.heartbeats_sent,
                received = stats.messages_received,
                "Shutdown complete"
            );
            Ok(())
        }
        Err(e) => exit_with(e),
    }
}

/// Load the file/env configuration, then apply `run` flags on top
fn load_run_config(
    path: Option<&str>,
    address: Option<u16>,
    peers: Option<String>,
    heartbeat_ms: Option<u64>,
) -> Result<NodeConfig> {
    let mut config = NodeConfig::load(path)?;

    if let Some(address) = address {
        config.node.address = address;
    }
    if let Some(peers) = peers {
        config.peers =
            parse_peer_list(&peers).map_err(|e| Error::config_field_invalid("--peers", e))?;
    }
    if let Some(ms) = heartbeat_ms {
        config.node.heartbeat_interval_ms = ms;
    }

    config.validate()?;
    Ok(config)
}

fn exit_with(e: Error) -> ! {
    eprint!("{}", e.format_for_terminal());
    std::process::exit(e.exit_code());
}

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = NodeConfig::load(config.as_deref()).unwrap_or_else(|e| exit_with(e));
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force).unwrap_or_else(|e| exit_with(e));
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => match NodeConfig::load(config.as_deref()) {
            Ok(cfg) => {
                println!(
                    "Configuration is valid ({} on port {}, {} peers).",
                    cfg.display_name(),
                    cfg.node.address,
                    cfg.peers.len()
                );
            }
            Err(e) => exit_with(e),
        },
    }

    Ok(())
}
