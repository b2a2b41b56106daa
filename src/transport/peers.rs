//! Peer list handed to a subscriber at start

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where a peer's broadcast endpoint listens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    pub port: u16,
}

/// Peer name → address. Fixed for the lifetime of a subscriber.
pub type PeerList = BTreeMap<String, PeerAddress>;

/// One past the highest configured peer port.
///
/// Reserved for adding peers at runtime; nothing allocates from it yet.
pub fn next_available_port(peers: &PeerList) -> Option<u16> {
    peers
        .values()
        .map(|p| p.port)
        .max()
        .and_then(|port| port.checked_add(1))
}

/// Parse `name=port` pairs separated by commas, e.g. `alpha=5001,beta=5002`
pub fn parse_peer_list(list: &str) -> Result<PeerList, String> {
    let mut peers = PeerList::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, port) = entry
            .split_once('=')
            .ok_or_else(|| format!("expected name=port, got '{}'", entry))?;
        let port = port
            .trim()
            .parse()
            .map_err(|e| format!("invalid port for peer '{}': {}", name.trim(), e))?;
        peers.insert(name.trim().to_string(), PeerAddress { port });
    }
    Ok(peers)
}
