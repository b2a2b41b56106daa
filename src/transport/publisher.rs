//! Publisher worker
//!
//! Owns the node's broadcast endpoint. Messages handed to
//! [`Publisher::send_message`] are queued and written, in order, to every
//! subscriber connected at the time of publishing. There is no delivery
//! acknowledgment: a subscriber that is not connected misses the message.
//!
//! Each accepted subscriber gets its own writer task fed by a bounded
//! channel, so one stalled reader never holds up the others. A subscriber
//! whose channel is full misses the frame.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::queue::MessageQueue;
use super::retry::bind_with_retry;
use super::state::{stop_channel, stop_requested, SharedState, WorkerState};
use super::{wire, TransportConfig};
use crate::error::{Error, Result};
use crate::protocol::{Identity, Message};

const WORKER: &str = "publisher";

type Frame = Arc<Vec<u8>>;

/// A connected subscriber as seen from the publishing side
struct SubscriberConn {
    addr: SocketAddr,
    frames: mpsc::Sender<Frame>,
    writer: JoinHandle<()>,
}

impl Drop for SubscriberConn {
    fn drop(&mut self) {
        // A writer stuck on a full socket would otherwise outlive the worker
        self.writer.abort();
    }
}

// ─────────────────────────────────────────────────────────────────
// Publisher
// ─────────────────────────────────────────────────────────────────

/// Handle to a node's publisher worker
pub struct Publisher {
    identity: Identity,
    config: TransportConfig,
    outbound: MessageQueue<Message>,
    state: SharedState,
    connected: Arc<AtomicUsize>,
    ready_tx: Option<watch::Sender<bool>>,
    ready_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<Result<()>>>,
}

impl Publisher {
    /// Create a publisher for `identity`. Nothing is bound until [`start`](Self::start).
    pub fn new(identity: Identity, config: TransportConfig) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        let (stop_tx, _) = stop_channel();

        Self {
            identity,
            config,
            outbound: MessageQueue::new(),
            state: SharedState::default(),
            connected: Arc::new(AtomicUsize::new(0)),
            ready_tx: Some(ready_tx),
            ready_rx,
            stop_tx,
            task: None,
        }
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// The worker binds `127.0.0.1:<identity>`, retrying while the port is
    /// busy, then waits out the warm-up before it starts publishing.
    pub fn start(&mut self) -> Result<()> {
        let ready_tx = self
            .ready_tx
            .take()
            .ok_or(Error::AlreadyStarted { worker: WORKER })?;

        info!(port = self.identity.port(), "Starting publisher");

        let task = tokio::spawn(run_publisher(
            self.identity,
            self.config.clone(),
            self.outbound.clone(),
            self.state.clone(),
            self.connected.clone(),
            ready_tx,
            self.stop_tx.subscribe(),
        ));
        self.task = Some(task);
        Ok(())
    }

    /// Wait until the endpoint is bound and the warm-up has elapsed
    pub async fn wait_until_ready(&self) -> Result<()> {
        if self.ready_tx.is_some() {
            return Err(Error::NotStarted { worker: WORKER });
        }

        let mut ready = self.ready_rx.clone();
        let _ = ready
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| Error::terminated(WORKER, "exited before becoming ready"))?;
        Ok(())
    }

    /// Whether the readiness signal has been raised
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Queue a message for publishing. Never blocks.
    pub fn send_message(&self, msg: Message) {
        self.outbound.push(msg);
    }

    /// Producer handle onto the outbound queue, for additional senders
    pub fn outbound(&self) -> MessageQueue<Message> {
        self.outbound.clone()
    }

    /// Number of subscribers currently connected
    pub fn subscriber_count(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }

    /// Ask the worker to stop. Pending writes to subscribers are abandoned.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Wait for the worker task to exit and return its outcome
    pub async fn join(&mut self) -> Result<()> {
        let task = self.task.take().ok_or(Error::NotStarted { worker: WORKER })?;
        task.await
            .map_err(|e| Error::terminated(WORKER, e.to_string()))?
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }
}

// ─────────────────────────────────────────────────────────────────
// Worker Loop
// ─────────────────────────────────────────────────────────────────

async fn run_publisher(
    identity: Identity,
    config: TransportConfig,
    outbound: MessageQueue<Message>,
    state: SharedState,
    connected: Arc<AtomicUsize>,
    ready_tx: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    state.set(WORKER, WorkerState::Binding);

    let bound = bind_with_retry(
        identity.port(),
        config.bind_retry_interval,
        config.bind_timeout,
        &mut shutdown,
    )
    .await;

    let listener = match bound {
        Ok(Some(listener)) => listener,
        Ok(None) => {
            info!("Publisher stopped before binding");
            state.set(WORKER, WorkerState::Stopped);
            return Ok(());
        }
        Err(e) => {
            error!(error = %e.format_for_log(), "Publisher failed to bind");
            state.set(WORKER, WorkerState::Failed);
            return Err(e);
        }
    };

    info!(
        port = identity.port(),
        warmup_ms = config.warmup.as_millis() as u64,
        "Publisher bound, warming up"
    );

    let queue_depth = config.subscriber_queue_depth.max(1);
    let mut subscribers: HashMap<u64, SubscriberConn> = HashMap::new();
    let mut next_id: u64 = 0;
    let (gone_tx, mut gone_rx) = mpsc::unbounded_channel::<u64>();

    let warmup = tokio::time::sleep(config.warmup);
    tokio::pin!(warmup);
    let mut ready = false;

    loop {
        tokio::select! {
            biased;

            _ = stop_requested(&mut shutdown) => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
                    }
                    let id = next_id;
                    next_id += 1;

                    let (frames_tx, frames_rx) = mpsc::channel::<Frame>(queue_depth);
                    let task = tokio::spawn(serve_subscriber(
                        id,
                        addr,
                        stream,
                        frames_rx,
                        gone_tx.clone(),
                    ));
                    subscribers.insert(id, SubscriberConn { addr, frames: frames_tx, writer: task });
                    connected.store(subscribers.len(), Ordering::Relaxed);
                    debug!(addr = %addr, subscribers = subscribers.len(), "Subscriber connected");
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },

            gone = gone_rx.recv() => {
                if let Some(conn) = gone.and_then(|id| subscribers.remove(&id)) {
                    connected.store(subscribers.len(), Ordering::Relaxed);
                    debug!(addr = %conn.addr, subscribers = subscribers.len(), "Subscriber removed");
                }
            }

            _ = &mut warmup, if !ready => {
                ready = true;
                state.set(WORKER, WorkerState::Running);
                ready_tx.send_replace(true);
                info!(subscribers = subscribers.len(), "Publisher ready");
            }

            msg = outbound.pop(), if ready => {
                publish(&msg, &mut subscribers);
                connected.store(subscribers.len(), Ordering::Relaxed);
            }
        }
    }

    state.set(WORKER, WorkerState::Stopping);
    let dropped = subscribers.len();
    drop(subscribers);
    connected.store(0, Ordering::Relaxed);
    drop(listener);

    info!(
        subscribers = dropped,
        unsent = outbound.len(),
        "Publisher stopped, endpoint released"
    );
    state.set(WORKER, WorkerState::Stopped);
    Ok(())
}

/// Hand one encoded message to every subscriber's writer.
///
/// A full channel drops the frame for that subscriber only. A closed channel
/// means its writer already exited, so the subscriber is removed.
fn publish(msg: &Message, subscribers: &mut HashMap<u64, SubscriberConn>) {
    let payload: Frame = match wire::encode(msg) {
        Ok(payload) => Arc::new(payload),
        Err(e) => {
            warn!(msg_type = %msg.kind, error = %e, "Failed to encode message, dropping");
            return;
        }
    };

    if subscribers.is_empty() {
        trace!(msg_type = %msg.kind, "No subscribers connected, message discarded");
        return;
    }

    subscribers.retain(|_, conn| match conn.frames.try_send(payload.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!(addr = %conn.addr, msg_type = %msg.kind, "Subscriber lagging, message dropped for it");
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!(addr = %conn.addr, "Subscriber writer gone, dropping subscriber");
            false
        }
    });

    trace!(
        msg_type = %msg.kind,
        sender = %msg.sender,
        subscribers = subscribers.len(),
        "Message published"
    );
}

/// Per-subscriber connection task.
///
/// Writes queued frames in order and watches the read half, which only ever
/// sees EOF since subscribers send nothing. Reports its id on exit so the
/// worker can forget the connection without waiting for the next publish.
async fn serve_subscriber(
    id: u64,
    addr: SocketAddr,
    stream: TcpStream,
    mut frames: mpsc::Receiver<Frame>,
    gone: mpsc::UnboundedSender<u64>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut scratch = [0u8; 64];

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = wire::write_frame(&mut writer, &frame).await {
                        debug!(addr = %addr, error = %e, "Subscriber write failed");
                        break;
                    }
                }
                None => break,
            },

            read = reader.read(&mut scratch) => match read {
                Ok(0) => {
                    debug!(addr = %addr, "Subscriber disconnected");
                    break;
                }
                Ok(n) => trace!(addr = %addr, bytes = n, "Ignoring bytes from subscriber"),
                Err(e) => {
                    debug!(addr = %addr, error = %e, "Subscriber read failed");
                    break;
                }
            },
        }
    }

    let _ = gone.send(id);
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
