//! Supervising node
//!
//! Owns one publisher and one subscriber and drives them from a single
//! event loop: optional heartbeats on a timer, periodic draining of the
//! inbound queue, and shutdown on Ctrl+C.
//!
//! Leadership works by reservation. Before each heartbeat window the node
//! queues a leader signal on its own subscriber. When the window closes,
//! the heartbeat goes out only if the signal survived; a heartbeat from any
//! other node in the meantime will have cleared it.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::protocol::{Identity, Message, MessageType};
use crate::transport::{Publisher, Subscriber, WorkerState};

/// Counters kept by a running node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub heartbeats_sent: u64,
    pub stand_downs: u64,
    pub messages_received: u64,
}

/// A peer-group member: publisher, subscriber and the loop between them
pub struct Node {
    name: String,
    identity: Identity,
    heartbeat_interval: Option<Duration>,
    poll_interval: Duration,
    publisher: Publisher,
    subscriber: Subscriber,
    stats: NodeStats,
}

impl Node {
    pub fn new(config: &NodeConfig) -> Self {
        let identity = config.identity();
        let transport = config.transport.to_transport_config();

        Self {
            name: config.display_name(),
            identity,
            heartbeat_interval: (config.node.heartbeat_interval_ms > 0)
                .then(|| Duration::from_millis(config.node.heartbeat_interval_ms)),
            poll_interval: Duration::from_millis(config.node.poll_interval_ms.max(1)),
            publisher: Publisher::new(identity, transport.clone()),
            subscriber: Subscriber::new(identity, config.peers.clone(), transport),
            stats: NodeStats::default(),
        }
    }

    /// Run until Ctrl+C
    pub async fn run(self) -> Result<NodeStats> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C, running until killed");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Run until `shutdown` completes, then stop both workers
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<NodeStats>
    where
        F: Future<Output = ()>,
    {
        info!(
            node = %self.name,
            identity = %self.identity,
            peers = self.subscriber.peers().len(),
            heartbeat_ms = self.heartbeat_interval.map(|d| d.as_millis() as u64),
            "Starting node"
        );

        self.publisher.start()?;
        self.subscriber.start()?;

        let outcome = self.event_loop(shutdown).await;

        self.publisher.stop();
        self.subscriber.stop();
        let published = self.publisher.join().await;
        let subscribed = self.subscriber.join().await;

        info!(
            node = %self.name,
            heartbeats = self.stats.heartbeats_sent,
            stand_downs = self.stats.stand_downs,
            received = self.stats.messages_received,
            "Node stopped"
        );

        // A worker's own error says more than the loop noticing it died
        published?;
        subscribed?;
        outcome?;
        Ok(self.stats)
    }

    async fn event_loop<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(()),
            ready = self.publisher.wait_until_ready() => ready?,
        }
        info!(node = %self.name, "Publisher ready, node running");

        // First reservation; every heartbeat round renews it
        self.subscriber.queue_leader_message(self.leader_signal());

        let mut heartbeat = self.heartbeat_interval.map(|period| {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        let mut drain = interval(self.poll_interval);
        drain.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                _ = tick(&mut heartbeat) => {
                    self.heartbeat_round();
                }

                _ = drain.tick() => {
                    self.drain_inbound();
                    if self.publisher.state() == WorkerState::Failed
                        || self.subscriber.state() == WorkerState::Failed
                    {
                        warn!(node = %self.name, "Worker failed, stopping node");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Send a heartbeat if this node's reservation survived, then renew it.
    ///
    /// Returns whether a heartbeat was queued.
    pub fn heartbeat_round(&mut self) -> bool {
        let reserved = self.subscriber.get_leader_message().is_some();

        if reserved {
            let beat = Message::heartbeat(self.identity)
                .with_field("seq", self.stats.heartbeats_sent);
            self.publisher.send_message(beat);
            self.stats.heartbeats_sent += 1;
            debug!(seq = self.stats.heartbeats_sent, "Heartbeat queued");
        } else {
            self.stats.stand_downs += 1;
            info!(node = %self.name, "Another node is heartbeating, standing down this round");
        }

        self.subscriber.queue_leader_message(self.leader_signal());
        reserved
    }

    /// Pop every admitted message and log it
    pub fn drain_inbound(&mut self) -> usize {
        let mut drained = 0;
        while let Some(msg) = self.subscriber.get_message() {
            drained += 1;
            if msg.sender == self.identity {
                debug!(msg_type = %msg.kind, "Own message echoed back");
            } else {
                info!(
                    msg_type = %msg.kind,
                    sender = %msg.sender,
                    direct = !msg.is_broadcast(),
                    "Message from peer"
                );
            }
        }
        self.stats.messages_received += drained as u64;
        drained
    }

    fn leader_signal(&self) -> Message {
        Message::broadcast(MessageType::LeaderAnnounce, self.identity)
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }
}

/// Tick an optional timer; a missing timer never fires
async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::parse_peer_list;

    fn config(address: u16) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.node.address = address;
        config.node.heartbeat_interval_ms = 100;
        config.peers = parse_peer_list("alpha=5001,beta=5002").unwrap();
        config
    }

    #[test]
    fn test_heartbeat_sent_while_reservation_holds() {
        let mut node = Node::new(&config(5001));
        node.subscriber.queue_leader_message(node.leader_signal());

        assert!(node.heartbeat_round());
        assert!(node.heartbeat_round());

        assert_eq!(node.stats().heartbeats_sent, 2);
        assert_eq!(node.publisher().outbound().len(), 2);

        let first = node.publisher().outbound().try_pop().unwrap();
        assert!(first.is_heartbeat());
        assert_eq!(first.sender, Identity::new(5001));
        assert_eq!(first.payload["seq"], 0);
    }

    #[test]
    fn test_stands_down_without_reservation() {
        let mut node = Node::new(&config(5002));

        assert!(!node.heartbeat_round());
        assert_eq!(node.stats().stand_downs, 1);
        assert!(node.publisher().outbound().is_empty());

        // The round renewed the reservation
        assert!(node.heartbeat_round());
        assert_eq!(node.stats().heartbeats_sent, 1);
    }

    #[test]
    fn test_drain_counts_messages() {
        let mut node = Node::new(&config(5002));
        assert_eq!(node.drain_inbound(), 0);
        assert_eq!(node.stats().messages_received, 0);
    }

    #[test]
    fn test_passive_node_has_no_heartbeat() {
        let mut passive = config(5003);
        passive.node.heartbeat_interval_ms = 0;
        let node = Node::new(&passive);
        assert!(node.heartbeat_interval.is_none());
        assert_eq!(node.identity(), Identity::new(5003));
    }
}
