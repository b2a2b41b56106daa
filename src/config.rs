//! Configuration system for beacon nodes
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (BEACON_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::Identity;
use crate::transport::{parse_peer_list, PeerList, TransportConfig};

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identity and supervisor behaviour
    pub node: NodeSettings,

    /// Every peer the subscriber connects to, keyed by name
    pub peers: PeerList,

    /// Transport timing and limits
    pub transport: TransportSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Node identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Human-readable node name (used in logs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Node address, also the port its publisher binds
    pub address: u16,

    /// Heartbeat interval in milliseconds (0 = never send heartbeats)
    pub heartbeat_interval_ms: u64,

    /// How often the node drains its subscriber queues, in milliseconds
    pub poll_interval_ms: u64,
}

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Pause between attempts to bind a busy port, in milliseconds
    pub bind_retry_interval_ms: u64,

    /// Give up binding after this many milliseconds (0 = retry forever)
    pub bind_timeout_ms: u64,

    /// Warm-up after bind/connect before publishing starts, in milliseconds
    pub warmup_ms: u64,

    /// First reconnect delay for peer links, in milliseconds
    pub connect_retry_initial_ms: u64,

    /// Maximum reconnect delay for peer links, in milliseconds
    pub connect_retry_max_ms: u64,

    /// Largest accepted frame in bytes
    pub max_frame_bytes: u32,

    /// Frames buffered per subscriber before a lagging one starts missing messages
    pub subscriber_queue_depth: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// File rotation: hourly, daily or never
    pub rotation: String,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: None,
            address: 5001,
            heartbeat_interval_ms: 0, // Passive node
            poll_interval_ms: 10,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            bind_retry_interval_ms: 100,
            bind_timeout_ms: 0, // Forever
            warmup_ms: 1000,
            connect_retry_initial_ms: 100,
            connect_retry_max_ms: 2000,
            max_frame_bytes: 1024 * 1024,
            subscriber_queue_depth: 1000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            rotation: "daily".to_string(),
            max_files: 5,
            json_format: false,
        }
    }
}

impl TransportSettings {
    /// Convert to the runtime transport configuration
    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            bind_retry_interval: Duration::from_millis(self.bind_retry_interval_ms),
            bind_timeout: (self.bind_timeout_ms > 0)
                .then(|| Duration::from_millis(self.bind_timeout_ms)),
            warmup: Duration::from_millis(self.warmup_ms),
            connect_retry_initial: Duration::from_millis(self.connect_retry_initial_ms),
            connect_retry_max: Duration::from_millis(self.connect_retry_max_ms),
            max_frame_bytes: self.max_frame_bytes,
            subscriber_queue_depth: self.subscriber_queue_depth,
        }
    }
}

impl NodeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides()?;

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: e.message().to_string(),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            return if path.exists() {
                Ok(Some(path))
            } else {
                Err(Error::ConfigNotFound { path })
            };
        }

        let search_paths = [
            PathBuf::from("beacon-node.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("beacon").join("node.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".beacon").join("node.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/beacon/node.toml"),
        ];

        for path in &search_paths {
            if path.is_file() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("BEACON_NODE_NAME") {
            self.node.name = Some(val);
        }
        if let Some(n) = env_number("BEACON_NODE_ADDRESS") {
            self.node.address = n;
        }
        if let Some(n) = env_number("BEACON_HEARTBEAT_INTERVAL_MS") {
            self.node.heartbeat_interval_ms = n;
        }
        if let Ok(val) = std::env::var("BEACON_PEERS") {
            self.peers = parse_peer_list(&val)
                .map_err(|e| Error::config_field_invalid("BEACON_PEERS", e))?;
        }

        if let Some(n) = env_number("BEACON_WARMUP_MS") {
            self.transport.warmup_ms = n;
        }
        if let Some(n) = env_number("BEACON_BIND_TIMEOUT_MS") {
            self.transport.bind_timeout_ms = n;
        }

        if let Ok(val) = std::env::var("BEACON_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("BEACON_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("BEACON_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }

        Ok(())
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.node.address == 0 {
            return Err(Error::config_field_invalid(
                "node.address",
                "node address must be a non-zero port",
            ));
        }

        if let Some((name, _)) = self.peers.iter().find(|(_, p)| p.port == 0) {
            return Err(Error::config_field_invalid(
                format!("peers.{}.port", name),
                format!("peer '{}' must have a non-zero port", name),
            ));
        }

        if self.node.poll_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "node.poll_interval_ms",
                "poll interval must be at least 1ms",
            ));
        }

        if self.transport.bind_retry_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "transport.bind_retry_interval_ms",
                "bind retry interval must be at least 1ms",
            ));
        }

        if self.transport.connect_retry_initial_ms > self.transport.connect_retry_max_ms {
            return Err(Error::config_field_invalid(
                "transport.connect_retry_initial_ms",
                "initial reconnect delay cannot exceed connect_retry_max_ms",
            ));
        }

        if self.transport.max_frame_bytes == 0 {
            return Err(Error::config_field_invalid(
                "transport.max_frame_bytes",
                "frame limit must be positive",
            ));
        }

        if self.transport.subscriber_queue_depth == 0 {
            return Err(Error::config_field_invalid(
                "transport.subscriber_queue_depth",
                "subscriber queue depth must be at least 1",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        let valid_rotations = ["hourly", "daily", "never"];
        if !valid_rotations.contains(&self.logging.rotation.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.rotation",
                format!(
                    "Invalid rotation '{}'. Must be one of: {}",
                    self.logging.rotation,
                    valid_rotations.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// This node's identity
    pub fn identity(&self) -> Identity {
        Identity::new(self.node.address)
    }

    /// Name used in logs
    pub fn display_name(&self) -> String {
        self.node
            .name
            .clone()
            .unwrap_or_else(|| format!("node-{}", self.node.address))
    }
}

/// Read and parse a numeric environment variable, ignoring garbage
fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".beacon")
                .join("node.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, DEFAULT_CONFIG).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Default configuration content with comments
const DEFAULT_CONFIG: &str = r#"# Beacon Node Configuration

[node]
# Human-readable node name (used in logs only)
# name = "alpha"

# Node address; also the TCP port the publisher binds on 127.0.0.1
address = 5001

# Heartbeat interval in milliseconds (0 = never send heartbeats)
heartbeat_interval_ms = 0

# How often queued messages are drained, in milliseconds
poll_interval_ms = 10

# Every peer this node subscribes to. Include this node to hear its own
# heartbeats.
# [peers.alpha]
# port = 5001
#
# [peers.beta]
# port = 5002

[transport]
# Pause between attempts to bind a busy port (milliseconds)
bind_retry_interval_ms = 100

# Give up binding after this long (milliseconds, 0 = retry forever)
bind_timeout_ms = 0

# Warm-up before publishing starts, so subscribers can connect (milliseconds)
warmup_ms = 1000

# Reconnect delays for peer links (milliseconds)
connect_retry_initial_ms = 100
connect_retry_max_ms = 2000

# Largest accepted frame in bytes
max_frame_bytes = 1048576

# Frames buffered per subscriber; a subscriber that falls further behind
# misses messages instead of stalling the others
subscriber_queue_depth = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.beacon/logs/node.log"

# File rotation: hourly, daily, never
rotation = "daily"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#;
