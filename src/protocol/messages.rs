//! Peer message definitions
//!
//! Messages are JSON objects carrying a `type` discriminator, a `sender`
//! identity and an optional `receiver` identity. Every other top-level field
//! belongs to the payload and is carried through untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────

/// Address of a node in the peer group.
///
/// The value is also the TCP port the node's publisher binds, so it must be
/// unique across the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(u16);

impl Identity {
    pub const fn new(address: u16) -> Self {
        Self(address)
    }

    /// Port the node's broadcast endpoint listens on
    pub const fn port(&self) -> u16 {
        self.0
    }
}

impl From<u16> for Identity {
    fn from(address: u16) -> Self {
        Self(address)
    }
}

impl FromStr for Identity {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────
// Message Types
// ─────────────────────────────────────────────────────────────────

/// Closed set of message kinds exchanged by the peer group.
///
/// Only `Heartbeat` has meaning to the transport; the rest are routed
/// without inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Liveness/leadership assertion from the current leader
    Heartbeat,

    /// A node asks the group to start an election
    Election,

    /// Ballot cast in an election
    Vote,

    /// A node announces it has won an election
    LeaderAnnounce,

    /// Application data
    Data,
}

impl MessageType {
    /// Get the wire name of the type
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageType::Heartbeat => "HEARTBEAT",
            MessageType::Election => "ELECTION",
            MessageType::Vote => "VOTE",
            MessageType::LeaderAnnounce => "LEADER_ANNOUNCE",
            MessageType::Data => "DATA",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────

/// A message as it travels between publisher and subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Identity of the node that produced the message
    pub sender: Identity,

    /// Target node; `None` (absent or null on the wire) means broadcast
    #[serde(default)]
    pub receiver: Option<Identity>,

    /// Protocol-specific fields
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Message {
    /// Create a broadcast message with an empty payload
    pub fn broadcast(kind: MessageType, sender: Identity) -> Self {
        Self {
            kind,
            sender,
            receiver: None,
            payload: Map::new(),
        }
    }

    /// Create a message addressed to a single node
    pub fn direct(kind: MessageType, sender: Identity, receiver: Identity) -> Self {
        Self {
            receiver: Some(receiver),
            ..Self::broadcast(kind, sender)
        }
    }

    /// Create a broadcast heartbeat
    pub fn heartbeat(sender: Identity) -> Self {
        Self::broadcast(MessageType::Heartbeat, sender)
    }

    /// Attach a payload field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn is_heartbeat(&self) -> bool {
        self.kind == MessageType::Heartbeat
    }

    pub fn is_broadcast(&self) -> bool {
        self.receiver.is_none()
    }

    /// Whether a subscriber with `identity` should accept this message
    pub fn is_for(&self, identity: Identity) -> bool {
        match self.receiver {
            None => true,
            Some(receiver) => receiver == identity,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_serialize() {
        let msg = Message::heartbeat(Identity::new(5001));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "HEARTBEAT");
        assert_eq!(json["sender"], 5001);
        assert!(json["receiver"].is_null());
    }

    #[test]
    fn test_absent_receiver_is_broadcast() {
        let msg: Message = serde_json::from_str(r#"{"type":"VOTE","sender":5002}"#).unwrap();
        assert!(msg.is_broadcast());
        assert!(msg.is_for(Identity::new(5003)));
    }

    #[test]
    fn test_payload_fields_preserved() {
        let raw = r#"{"type":"DATA","sender":5001,"receiver":5002,"term":7,"body":{"k":"v"}}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();

        assert_eq!(msg.kind, MessageType::Data);
        assert_eq!(msg.receiver, Some(Identity::new(5002)));
        assert_eq!(msg.payload["term"], 7);
        assert_eq!(msg.payload["body"]["k"], "v");
        assert!(!msg.payload.contains_key("type"));
    }

    #[test]
    fn test_missing_sender_rejected() {
        let result = serde_json::from_str::<Message>(r#"{"type":"HEARTBEAT","receiver":null}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = serde_json::from_str::<Message>(r#"{"type":"GOSSIP","sender":5001}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_addressing() {
        let me = Identity::new(5002);
        let to_me = Message::direct(MessageType::Vote, Identity::new(5001), me);
        let to_other = Message::direct(MessageType::Vote, Identity::new(5001), Identity::new(5003));

        assert!(to_me.is_for(me));
        assert!(!to_other.is_for(me));
    }

    #[test]
    fn test_identity_parse() {
        assert_eq!(" 5001 ".parse::<Identity>().unwrap(), Identity::new(5001));
        assert!("abc".parse::<Identity>().is_err());
        assert_eq!(Identity::new(5001).to_string(), "5001");
    }
}
