//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// Beacon node - heartbeat-based leader signalling over loopback pub/sub
///
/// Runs one publisher bound to the node's own port and one subscriber
/// connected to every configured peer.
#[derive(Parser, Debug)]
#[command(name = "beacon-node")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the node until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "BEACON_CONFIG")]
        config: Option<String>,

        /// Override the node address (publisher port)
        #[arg(short, long)]
        address: Option<u16>,

        /// Override the peer list, e.g. alpha=5001,beta=5002
        #[arg(short, long)]
        peers: Option<String>,

        /// Override the heartbeat interval in milliseconds (0 = passive)
        #[arg(long)]
        heartbeat_ms: Option<u64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Write a commented default configuration file
    Init {
        /// Where to create the file (default ~/.beacon/node.toml)
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Check a configuration file without starting the node
    Validate {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["beacon-node", "run"]);
        match cli.command {
            Commands::Run {
                config,
                address,
                peers,
                heartbeat_ms,
            } => {
                assert!(config.is_none());
                assert!(address.is_none());
                assert!(peers.is_none());
                assert!(heartbeat_ms.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_overrides() {
        let cli = Cli::parse_from([
            "beacon-node",
            "run",
            "--config",
            "/etc/beacon/node.toml",
            "--address",
            "5002",
            "--peers",
            "alpha=5001,beta=5002",
            "--heartbeat-ms",
            "250",
        ]);
        match cli.command {
            Commands::Run {
                config,
                address,
                peers,
                heartbeat_ms,
            } => {
                assert_eq!(config.as_deref(), Some("/etc/beacon/node.toml"));
                assert_eq!(address, Some(5002));
                assert_eq!(peers.as_deref(), Some("alpha=5001,beta=5002"));
                assert_eq!(heartbeat_ms, Some(250));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_rejects_bad_address() {
        assert!(Cli::try_parse_from(["beacon-node", "run", "--address", "70000"]).is_err());
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["beacon-node", "-vv", "run"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_flag_is_global() {
        let cli = Cli::parse_from(["beacon-node", "config", "show", "--quiet"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["beacon-node", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_config_validate() {
        let cli = Cli::parse_from(["beacon-node", "config", "validate", "-c", "node.toml"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Validate { config },
            } => assert_eq!(config.as_deref(), Some("node.toml")),
            _ => panic!("Expected Config Validate command"),
        }
    }
}
