//! Subscriber/aggregator worker
//!
//! Opens one link per configured peer and funnels every frame into a single
//! receive loop. For each decoded message the loop:
//!
//! 1. drains the leader queue if the message is a heartbeat from another
//!    node (someone else currently holds leadership), then
//! 2. admits the message into the inbound queue if it is broadcast or
//!    addressed to this node.
//!
//! The two steps are independent: a heartbeat addressed elsewhere still
//! invalidates queued leader signals.

use anyhow::Context;
use backoff::backoff::Backoff;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::peers::{next_available_port, PeerList};
use super::queue::MessageQueue;
use super::retry::{connect_backoff, connect_with_retry};
use super::state::{stop_channel, stop_requested, SharedState, WorkerState};
use super::{wire, TransportConfig};
use crate::error::{Error, Result};
use crate::protocol::{Identity, Message};

const WORKER: &str = "subscriber";

/// Raw frame received on one peer link
#[derive(Debug)]
struct InboundFrame {
    peer: String,
    payload: Vec<u8>,
}

// ─────────────────────────────────────────────────────────────────
// Leader Arbitration
// ─────────────────────────────────────────────────────────────────

/// Outcome of routing one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Routing {
    /// The message went into the inbound queue
    pub admitted: bool,

    /// Leader signals discarded because of a foreign heartbeat
    pub leader_signals_dropped: usize,
}

/// Applies addressing and leader arbitration for one node
#[derive(Debug, Clone)]
pub struct Arbiter {
    identity: Identity,
    inbound: MessageQueue<Message>,
    leader: MessageQueue<Message>,
}

impl Arbiter {
    pub fn new(
        identity: Identity,
        inbound: MessageQueue<Message>,
        leader: MessageQueue<Message>,
    ) -> Self {
        Self {
            identity,
            inbound,
            leader,
        }
    }

    /// Route one received message
    pub fn route(&self, msg: Message) -> Routing {
        let mut routing = Routing::default();

        if msg.is_heartbeat() && msg.sender != self.identity {
            routing.leader_signals_dropped = self.leader.drain();
        }

        if msg.is_for(self.identity) {
            self.inbound.push(msg);
            routing.admitted = true;
        }

        routing
    }
}

// ─────────────────────────────────────────────────────────────────
// Subscriber
// ─────────────────────────────────────────────────────────────────

/// Handle to a node's subscriber worker
pub struct Subscriber {
    identity: Identity,
    peers: PeerList,
    config: TransportConfig,
    inbound: MessageQueue<Message>,
    leader: MessageQueue<Message>,
    state: SharedState,
    stop_tx: watch::Sender<bool>,
    next_port: Option<u16>,
    task: Option<JoinHandle<Result<()>>>,
}

impl Subscriber {
    /// Create a subscriber for `identity` that will listen to every peer in `peers`
    pub fn new(identity: Identity, peers: PeerList, config: TransportConfig) -> Self {
        let (stop_tx, _) = stop_channel();

        Self {
            identity,
            peers,
            config,
            inbound: MessageQueue::new(),
            leader: MessageQueue::new(),
            state: SharedState::default(),
            stop_tx,
            next_port: None,
            task: None,
        }
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// Links to every peer are opened in the background and keep
    /// reconnecting until [`stop`](Self::stop). The receive loop starts
    /// after the warm-up; frames that arrive earlier are held, not lost.
    pub fn start(&mut self) -> Result<()> {
        // A joined worker cannot be restarted: its stop flag stays raised
        if self.task.is_some() || self.state.get() != WorkerState::NotStarted {
            return Err(Error::AlreadyStarted { worker: WORKER });
        }

        self.next_port = next_available_port(&self.peers);
        info!(
            identity = %self.identity,
            peers = self.peers.len(),
            next_port = ?self.next_port,
            "Starting subscriber"
        );

        let arbiter = Arbiter::new(self.identity, self.inbound.clone(), self.leader.clone());
        let task = tokio::spawn(run_subscriber(
            self.peers.clone(),
            self.config.clone(),
            arbiter,
            self.state.clone(),
            self.stop_tx.subscribe(),
        ));
        self.task = Some(task);
        Ok(())
    }

    /// Pop the oldest admitted message without waiting
    pub fn get_message(&self) -> Option<Message> {
        self.inbound.try_pop()
    }

    /// Pop the oldest surviving leader signal without waiting
    pub fn get_leader_message(&self) -> Option<Message> {
        self.leader.try_pop()
    }

    /// Queue a signal that only stays valid while no other node heartbeats
    pub fn queue_leader_message(&self, msg: Message) {
        self.leader.push(msg);
    }

    /// Ask the worker to stop and close every peer link
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Wait for the worker task to exit and return its outcome
    pub async fn join(&mut self) -> Result<()> {
        let task = self.task.take().ok_or(Error::NotStarted { worker: WORKER })?;
        task.await
            .map_err(|e| Error::terminated(WORKER, e.to_string()))?
    }

    /// Port reserved for the next peer to join (computed at start, unused)
    pub fn next_port(&self) -> Option<u16> {
        self.next_port
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn peers(&self) -> &PeerList {
        &self.peers
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }
}

// ─────────────────────────────────────────────────────────────────
// Worker Loop
// ─────────────────────────────────────────────────────────────────

async fn run_subscriber(
    peers: PeerList,
    config: TransportConfig,
    arbiter: Arbiter,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    state.set(WORKER, WorkerState::Connecting);

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let links: Vec<JoinHandle<()>> = peers
        .iter()
        .map(|(name, addr)| {
            tokio::spawn(run_link(
                name.clone(),
                addr.port,
                config.clone(),
                frame_tx.clone(),
                shutdown.clone(),
            ))
        })
        .collect();
    drop(frame_tx);

    let warmed_up = tokio::select! {
        _ = tokio::time::sleep(config.warmup) => true,
        _ = stop_requested(&mut shutdown) => false,
    };

    if warmed_up {
        state.set(WORKER, WorkerState::Running);
        info!(links = links.len(), "Subscriber running");

        loop {
            tokio::select! {
                biased;

                _ = stop_requested(&mut shutdown) => break,

                frame = frame_rx.recv() => match frame {
                    Some(frame) => handle_frame(&arbiter, frame),
                    None => {
                        // No peer links remain; idle until told to stop
                        stop_requested(&mut shutdown).await;
                        break;
                    }
                },
            }
        }
    }

    state.set(WORKER, WorkerState::Stopping);
    drop(frame_rx);
    for link in links {
        if let Err(e) = link.await {
            warn!(error = %e, "Peer link task failed");
        }
    }

    info!("Subscriber stopped, links closed");
    state.set(WORKER, WorkerState::Stopped);
    Ok(())
}

/// Decode and route one frame; undecodable frames are logged and dropped
fn handle_frame(arbiter: &Arbiter, frame: InboundFrame) {
    let msg = match wire::decode(&frame.payload) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(
                peer = %frame.peer,
                bytes = frame.payload.len(),
                error = %e.format_for_log(),
                "Dropping malformed message"
            );
            return;
        }
    };

    let kind = msg.kind;
    let sender = msg.sender;
    let routing = arbiter.route(msg);

    if routing.leader_signals_dropped > 0 {
        debug!(
            sender = %sender,
            dropped = routing.leader_signals_dropped,
            "Foreign heartbeat observed, leader signals cleared"
        );
    }
    trace!(
        peer = %frame.peer,
        msg_type = %kind,
        sender = %sender,
        admitted = routing.admitted,
        "Message received"
    );
}

// ─────────────────────────────────────────────────────────────────
// Peer Links
// ─────────────────────────────────────────────────────────────────

/// Keep one peer subscribed: connect, pump frames, reconnect on loss.
///
/// The reconnect delay only starts over once a link has delivered a frame,
/// so a peer that accepts and immediately hangs up is retried with backoff.
async fn run_link(
    peer: String,
    port: u16,
    config: TransportConfig,
    frames: mpsc::UnboundedSender<InboundFrame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = connect_backoff(config.connect_retry_initial, config.connect_retry_max);

    loop {
        let Some(stream) = connect_with_retry(&peer, port, &mut backoff, &mut shutdown).await else {
            break;
        };
        debug!(peer = %peer, port, "Connected to peer");

        let mut received = 0u64;
        let outcome = pump_frames(
            &peer,
            stream,
            config.max_frame_bytes,
            &frames,
            &mut received,
            &mut shutdown,
        )
        .await;

        match outcome {
            Ok(()) => break,
            Err(e) => {
                let err = Error::ConnectionLost {
                    peer: peer.clone(),
                    message: format!("{:#}", e),
                };
                if received > 0 {
                    backoff.reset();
                    info!(error = %err, frames = received, "Peer link dropped, reconnecting");
                } else {
                    debug!(error = %err, "Peer closed link before sending anything");
                }
            }
        }

        let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
        tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown) => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!(peer = %peer, "Peer link closed");
}

/// Forward frames until the stream fails (`Err`) or the link should end (`Ok`)
async fn pump_frames(
    peer: &str,
    mut stream: TcpStream,
    max_frame_bytes: u32,
    frames: &mpsc::UnboundedSender<InboundFrame>,
    received: &mut u64,
    shutdown: &mut watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        let payload = tokio::select! {
            biased;
            _ = stop_requested(shutdown) => return Ok(()),
            read = wire::read_frame(&mut stream, max_frame_bytes) => {
                read.with_context(|| format!("reading from {}", peer))?
            }
        };

        if *received == 0 {
            info!(peer = %peer, "Subscribed to peer");
        }
        *received += 1;

        let frame = InboundFrame {
            peer: peer.to_string(),
            payload,
        };
        if frames.send(frame).is_err() {
            // Receive loop is gone
            return Ok(());
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
