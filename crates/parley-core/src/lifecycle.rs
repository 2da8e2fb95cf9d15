//! Connection lifecycle: `Upgrading → Active → Closing → Closed`.
//!
//! [`ConnectionLifecycle::attach`] registers the connection and starts its
//! writer task. [`ActiveConnection::run`] is the receive loop; when it ends
//! the same call closes the transport, unregisters the connection and
//! removes its group if that left it empty. Only this path ever unregisters
//! a connection, so teardown runs exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::connection::PeerHandle;
use crate::directory::RegistryDirectory;
use crate::errors::{RelayError, TransportError};
use crate::frame::{CLOSE_GOING_AWAY, CLOSE_POLICY, CloseFrame, Frame};
use crate::group::{DuplicatePolicy, GroupRegistry};
use crate::ids::{ClientId, ConnectionId, GroupCode};
use crate::message::Message;
use crate::metrics::{
    RELAY_CONNECTIONS_ACTIVE, RELAY_CONNECTIONS_TOTAL, RELAY_DISCONNECTIONS_TOTAL,
    RELAY_DUPLICATE_JOINS_TOTAL, RELAY_FRAMES_RECEIVED_TOTAL,
};
use crate::transport::{FrameSink, FrameSource};

/// Default bound on frames queued for one client.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;
/// Default time the writer gets to close the transport at teardown.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-connection knobs.
#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// Bound of the outbound queue feeding the writer task.
    pub send_queue_capacity: usize,
    /// Handling of an identifier that is already in the group.
    pub duplicate_policy: DuplicatePolicy,
    /// How long teardown waits for the writer to close the transport.
    pub close_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            duplicate_policy: DuplicatePolicy::default(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport upgraded, not yet registered.
    Upgrading,
    /// Registered; receive loop may run.
    Active,
    /// Receive loop ended; teardown in progress.
    Closing,
    /// Transport closed and connection unregistered.
    Closed,
}

/// Why a connection's receive loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame.
    ClientClosed(Option<CloseFrame>),
    /// The inbound stream ended without a close frame.
    StreamEnded,
    /// Reading failed.
    Transport(TransportError),
    /// The writer task stopped, usually after a failed write.
    WriterStopped,
    /// Displaced by a newer connection, timed out, or server shutdown.
    CloseRequested,
}

impl CloseReason {
    /// Whether this is a routine disconnect.
    pub fn is_expected(&self) -> bool {
        match self {
            Self::ClientClosed(frame) => frame.as_ref().is_none_or(CloseFrame::is_expected),
            Self::Transport(e) => e.is_expected(),
            Self::StreamEnded | Self::WriterStopped | Self::CloseRequested => true,
        }
    }

    /// Label used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed(_) => "client_closed",
            Self::StreamEnded => "stream_ended",
            Self::Transport(_) => "transport_error",
            Self::WriterStopped => "writer_stopped",
            Self::CloseRequested => "close_requested",
        }
    }
}

/// A connection that has been upgraded but not yet registered.
pub struct ConnectionLifecycle {
    directory: Arc<RegistryDirectory>,
    group: GroupCode,
    client: ClientId,
    config: LifecycleConfig,
    shutdown: CancellationToken,
}

impl ConnectionLifecycle {
    /// Prepare a lifecycle. `shutdown` is the parent of the connection's
    /// close token.
    pub fn new(
        directory: Arc<RegistryDirectory>,
        group: GroupCode,
        client: ClientId,
        config: LifecycleConfig,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            directory,
            group,
            client,
            config,
            shutdown: shutdown.clone(),
        }
    }

    /// Current state; always [`ConnectionState::Upgrading`].
    pub fn state(&self) -> ConnectionState {
        ConnectionState::Upgrading
    }

    /// Register the connection and start its writer task.
    ///
    /// On a rejected duplicate the transport is sent a policy close frame
    /// and closed before the error is returned.
    pub async fn attach<K: FrameSink>(self, mut sink: K) -> Result<ActiveConnection, RelayError> {
        let (tx, rx) = mpsc::channel(self.config.send_queue_capacity.max(1));
        let handle = Arc::new(PeerHandle::new(self.client.clone(), tx, &self.shutdown));

        let joined = match self
            .directory
            .join(&self.group, handle.clone(), self.config.duplicate_policy)
        {
            Ok(joined) => joined,
            Err(e) => {
                ::metrics::counter!(RELAY_DUPLICATE_JOINS_TOTAL).increment(1);
                warn!(group = %self.group, client = %self.client, error = %e, "join refused");
                let refusal = CloseFrame::new(CLOSE_POLICY, "identifier already connected");
                let _ = sink.send(Frame::Close(Some(refusal))).await;
                let _ = sink.close().await;
                return Err(e);
            }
        };

        let (writer_stop, stop_rx) = oneshot::channel();
        let writer = tokio::spawn(write_loop(sink, rx, stop_rx, handle.connection_id()));

        ::metrics::counter!(RELAY_CONNECTIONS_TOTAL).increment(1);
        ::metrics::gauge!(RELAY_CONNECTIONS_ACTIVE).increment(1.0);
        info!(
            group = %self.group,
            client = %self.client,
            connection = %handle.connection_id(),
            members = joined.group.len(),
            replaced = joined.displaced.is_some(),
            "client joined"
        );

        Ok(ActiveConnection {
            directory: self.directory,
            group: joined.group,
            handle,
            writer,
            writer_stop,
            shutdown: self.shutdown,
            close_timeout: self.config.close_timeout,
        })
    }
}

/// A registered connection whose receive loop has not finished yet.
pub struct ActiveConnection {
    directory: Arc<RegistryDirectory>,
    group: Arc<GroupRegistry>,
    handle: Arc<PeerHandle>,
    writer: JoinHandle<()>,
    writer_stop: oneshot::Sender<Option<CloseFrame>>,
    shutdown: CancellationToken,
    close_timeout: Duration,
}

impl ActiveConnection {
    /// The registered handle.
    pub fn handle(&self) -> &Arc<PeerHandle> {
        &self.handle
    }

    /// The group the connection joined.
    pub fn group(&self) -> &Arc<GroupRegistry> {
        &self.group
    }

    /// Current state; always [`ConnectionState::Active`].
    pub fn state(&self) -> ConnectionState {
        ConnectionState::Active
    }

    /// Run the receive loop to completion, then tear down.
    pub async fn run<S: FrameSource>(mut self, mut source: S) -> CloseReason {
        let reason = self.receive(&mut source).await;
        self.teardown(&reason).await;
        reason
    }

    async fn receive<S: FrameSource>(&mut self, source: &mut S) -> CloseReason {
        loop {
            let next = tokio::select! {
                biased;
                () = self.handle.close_requested() => return CloseReason::CloseRequested,
                _ = &mut self.writer => return CloseReason::WriterStopped,
                next = source.recv() => next,
            };

            let frame = match next {
                None => return CloseReason::StreamEnded,
                Some(Err(e)) => return CloseReason::Transport(e),
                Some(Ok(frame)) => frame,
            };

            self.handle.mark_alive();
            ::metrics::counter!(RELAY_FRAMES_RECEIVED_TOTAL, "kind" => frame.kind().as_str())
                .increment(1);

            match frame {
                Frame::Close(close) => return CloseReason::ClientClosed(close),
                Frame::Ping(_) | Frame::Pong(_) => {}
                data => {
                    let message = Message::from_frame(self.handle.client_id().clone(), data);
                    let report = self.group.deliver(&message);
                    trace!(
                        client = %self.handle.client_id(),
                        route = ?report.route,
                        delivered = report.delivered,
                        dropped = report.dropped(),
                        "routed"
                    );
                }
            }
        }
    }

    /// Close frame the server sends when it is the side ending the connection.
    fn farewell(&self, reason: &CloseReason) -> Option<CloseFrame> {
        match reason {
            CloseReason::CloseRequested if self.shutdown.is_cancelled() => {
                Some(CloseFrame::new(CLOSE_GOING_AWAY, "server shutting down"))
            }
            CloseReason::CloseRequested => {
                Some(CloseFrame::new(CLOSE_POLICY, "connection closed by server"))
            }
            _ => None,
        }
    }

    async fn teardown(mut self, reason: &CloseReason) {
        let code = self.group.code().clone();
        let client = self.handle.client_id().clone();
        let connection = self.handle.connection_id();
        debug!(group = %code, client = %client, state = ?ConnectionState::Closing, reason = reason.as_str(), "tearing down");

        // Stops the heartbeat and anything else watching this handle.
        self.handle.request_close();

        // The writer owns the sink and closes it on exit.
        if !matches!(reason, CloseReason::WriterStopped) {
            let farewell = self.farewell(reason);
            let _ = self.writer_stop.send(farewell);
            match tokio::time::timeout(self.close_timeout, &mut self.writer).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(connection = %connection, error = %e, "writer task failed"),
                Err(_) => {
                    warn!(connection = %connection, "writer did not stop in time, aborting");
                    self.writer.abort();
                }
            }
        }

        // Retire the group only if this removal emptied it.
        if self.group.unregister_connection(&self.handle) {
            let _ = self.directory.remove_if_empty(&code);
        }

        ::metrics::counter!(RELAY_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        ::metrics::gauge!(RELAY_CONNECTIONS_ACTIVE).decrement(1.0);

        if reason.is_expected() {
            info!(
                group = %code,
                client = %client,
                connection = %connection,
                reason = reason.as_str(),
                dropped_frames = self.handle.drop_count(),
                "client left"
            );
        } else {
            warn!(
                group = %code,
                client = %client,
                connection = %connection,
                reason = ?reason,
                "client connection failed"
            );
        }
        trace!(connection = %connection, state = ?ConnectionState::Closed, "closed");
    }
}

/// Drain the outbound queue into the sink until stopped or a write fails,
/// then close the sink. This task is the only writer for its transport.
///
/// A stop signal carrying a close frame sends it before closing.
async fn write_loop<K: FrameSink>(
    mut sink: K,
    mut rx: mpsc::Receiver<Frame>,
    mut stop: oneshot::Receiver<Option<CloseFrame>>,
    connection: ConnectionId,
) {
    loop {
        let next = tokio::select! {
            biased;
            farewell = &mut stop => {
                if let Ok(Some(close)) = farewell {
                    if let Err(e) = sink.send(Frame::Close(Some(close))).await {
                        debug!(connection = %connection, error = %e, "close frame not sent");
                    }
                }
                break;
            }
            next = rx.recv() => next,
        };
        let Some(frame) = next else { break };
        if let Err(e) = sink.send(frame).await {
            if e.is_expected() {
                debug!(connection = %connection, "write on closed connection");
            } else {
                warn!(connection = %connection, error = %e, "write failed");
            }
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(connection = %connection, error = %e, "close failed");
    }
}
