//! Bind and connect retry loops
//!
//! Binding uses a constant interval: a busy port is expected to free up
//! once the previous owner shuts down. Connecting uses exponential backoff
//! so a group of nodes started in any order converges without hammering
//! ports that are not listening yet.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoff;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info};

use super::state::stop_requested;
use crate::error::{Error, Result};

/// Loopback address for a node port
pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Backoff used between reconnect attempts to a peer
pub fn connect_backoff(initial: Duration, max: Duration) -> ExponentialBackoff {
    let mut backoff = ExponentialBackoff {
        initial_interval: initial,
        max_interval: max,
        max_elapsed_time: None, // Retry forever
        ..Default::default()
    };
    backoff.reset();
    backoff
}

/// Bind the broadcast endpoint, retrying while the port is taken.
///
/// Returns `Ok(None)` if a stop was requested before the bind succeeded.
/// Without a `timeout` a busy port is retried until it frees up.
pub(crate) async fn bind_with_retry(
    port: u16,
    interval: Duration,
    timeout: Option<Duration>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<TcpListener>> {
    let addr = loopback(port);
    let mut backoff = Constant::new(interval);
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                if attempt > 1 {
                    info!(port, attempt, "Port became free, bound after retry");
                }
                return Ok(Some(listener));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port, attempt, "Port busy, retrying bind");
            }
            Err(e) => return Err(Error::BindFailed { port, source: e }),
        }

        if let Some(limit) = timeout {
            let waited = started.elapsed();
            if waited >= limit {
                return Err(Error::BindTimeout { port, waited });
            }
        }

        let delay = backoff.next_backoff().unwrap_or(interval);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_requested(shutdown) => return Ok(None),
        }
    }
}

/// Connect to a peer's broadcast endpoint, retrying until it accepts.
///
/// Returns `None` if a stop was requested first. The backoff is left as is
/// on success: a peer that accepts and then hangs up must not reset it.
pub(crate) async fn connect_with_retry(
    peer: &str,
    port: u16,
    backoff: &mut ExponentialBackoff,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<TcpStream> {
    let addr = loopback(port);

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer, error = %e, "Failed to set TCP_NODELAY");
                }
                return Some(stream);
            }
            Err(e) => {
                let err = Error::ConnectionFailed {
                    peer: peer.to_string(),
                    port,
                    message: e.to_string(),
                };
                debug!(error = %err, "Peer not reachable yet");
            }
        }

        let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_requested(shutdown) => return None,
        }
    }
}
