//! Heartbeat ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parley_core::{Frame, PeerHandle};
use tokio::time;
use tracing::{debug, warn};

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The connection was closed for some other reason.
    Cancelled,
}

/// Run heartbeat pings for a connection until it closes.
///
/// Every `interval` a ping is queued and the alive flag is checked (any
/// inbound frame sets it). Once `timeout / interval` consecutive checks
/// (at least 1) find it unset, the connection is asked to close and
/// `HeartbeatResult::TimedOut` is returned.
pub async fn run_heartbeat(
    handle: Arc<PeerHandle>,
    interval: Duration,
    timeout: Duration,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval.max(Duration::from_millis(1)));
    let mut missed: u32 = 0;
    let max_missed = max_missed(interval, timeout);

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if handle.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        warn!(
                            client = %handle.client_id(),
                            connection = %handle.connection_id(),
                            silent_for = ?handle.last_seen_elapsed(),
                            "heartbeat timed out"
                        );
                        handle.request_close();
                        return HeartbeatResult::TimedOut;
                    }
                }
                if !handle.send(Frame::Ping(Bytes::new())) {
                    debug!(connection = %handle.connection_id(), "ping not queued");
                }
            }
            () = handle.close_requested() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let ratio = timeout.as_millis() / interval.as_millis().max(1);
    u32::try_from(ratio).unwrap_or(u32::MAX).max(1)
}
