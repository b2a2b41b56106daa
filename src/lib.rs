//! Beacon mesh - heartbeat-based leader signalling over loopback pub/sub
//!
//! Each node publishes on `127.0.0.1:<identity>` and subscribes to every
//! peer in its list. Heartbeats from other nodes invalidate leader signals
//! a node has queued for itself, which is all the arbitration there is.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod protocol;
pub mod transport;

pub use error::{Error, Result};
pub use node::Node;
pub use protocol::{Identity, Message, MessageType};
pub use transport::{Publisher, Subscriber, TransportConfig};
