//! Publish/subscribe transport between the nodes of a peer group
//!
//! Every node runs one [`Publisher`] bound to `127.0.0.1:<identity>` and one
//! [`Subscriber`] connected to each configured peer. The owning node talks to
//! both workers only through their queues and stop signals.

pub mod peers;
pub mod publisher;
pub mod queue;
pub mod retry;
pub mod state;
pub mod subscriber;
pub mod wire;

use std::time::Duration;

pub use peers::{next_available_port, parse_peer_list, PeerAddress, PeerList};
pub use publisher::Publisher;
pub use queue::MessageQueue;
pub use state::WorkerState;
pub use subscriber::Subscriber;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Timing and limits shared by publishers and subscribers
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Pause between attempts to bind a busy port
    pub bind_retry_interval: Duration,

    /// Give up binding after this long (`None` = retry forever)
    pub bind_timeout: Option<Duration>,

    /// Delay after bind/connect before the worker is considered ready,
    /// giving subscribers time to join before anything is published
    pub warmup: Duration,

    /// First reconnect delay for subscriber links
    pub connect_retry_initial: Duration,

    /// Upper bound on the reconnect delay
    pub connect_retry_max: Duration,

    /// Largest accepted frame
    pub max_frame_bytes: u32,

    /// Frames buffered per connected subscriber before new ones are
    /// dropped for that subscriber
    pub subscriber_queue_depth: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_retry_interval: Duration::from_millis(100),
            bind_timeout: None,
            warmup: Duration::from_secs(1),
            connect_retry_initial: Duration::from_millis(100),
            connect_retry_max: Duration::from_secs(2),
            max_frame_bytes: wire::DEFAULT_MAX_FRAME_BYTES,
            subscriber_queue_depth: 1000,
        }
    }
}
