//! Common test utilities and fixtures

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use beacon_mesh::transport::{PeerAddress, PeerList};
use beacon_mesh::TransportConfig;

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

/// Ask the OS for a loopback port that is free right now
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

/// Peer list from `(name, port)` pairs
pub fn peers(entries: &[(&str, u16)]) -> PeerList {
    entries
        .iter()
        .map(|(name, port)| (name.to_string(), PeerAddress { port: *port }))
        .collect()
}

/// Short timings so end-to-end tests finish quickly
pub fn fast_transport() -> TransportConfig {
    TransportConfig {
        bind_retry_interval: Duration::from_millis(20),
        warmup: Duration::from_millis(300),
        connect_retry_initial: Duration::from_millis(10),
        connect_retry_max: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Poll `check` until it yields a value or `timeout` passes
pub async fn wait_for<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check() {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_exist() {
        assert!(valid_config_fixture().exists());
        assert!(invalid_config_fixture().exists());
    }

    #[test]
    fn test_peers_helper() {
        let list = peers(&[("alpha", 5001), ("beta", 5002)]);
        assert_eq!(list.len(), 2);
        assert_eq!(list["beta"].port, 5002);
    }
}
