//! Connection handle: the registry's view of one connected client.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::frame::Frame;
use crate::ids::{ClientId, ConnectionId};

/// A registered client connection.
///
/// Writes go through a bounded queue drained by the connection's single
/// writer task, so concurrent fan-outs never interleave on the socket and a
/// slow client never blocks whoever is delivering to it.
pub struct PeerHandle {
    client_id: ClientId,
    connection_id: ConnectionId,
    /// Queue to the writer task.
    tx: mpsc::Sender<Frame>,
    /// When this connection was established.
    connected_at: Instant,
    /// Set on every inbound frame, cleared by the heartbeat.
    is_alive: AtomicBool,
    /// Last time any inbound frame was seen.
    last_seen: Mutex<Instant>,
    /// Frames that could not be queued.
    dropped_frames: AtomicU64,
    /// Cancelled when someone wants this connection gone.
    close: CancellationToken,
}

impl PeerHandle {
    /// Create a handle whose close token is a child of `parent`.
    pub fn new(client_id: ClientId, tx: mpsc::Sender<Frame>, parent: &CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            client_id,
            connection_id: ConnectionId::new(),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
            close: parent.child_token(),
        }
    }

    /// Registry key.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Identity of this physical connection.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue a frame for the writer task.
    ///
    /// Never waits. Returns `false` and counts a drop when the queue is full
    /// or the writer has already stopped.
    pub fn send(&self, frame: Frame) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Frames dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Read and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound frame (or since connect).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Ask the lifecycle loop to tear this connection down. Idempotent.
    pub fn request_close(&self) {
        self.close.cancel();
    }

    /// Whether a close was requested (directly or by the parent token).
    pub fn is_close_requested(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once a close is requested.
    pub fn close_requested(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("client_id", &self.client_id)
            .field("connection_id", &self.connection_id)
            .field("dropped_frames", &self.drop_count())
            .finish_non_exhaustive()
    }
}
