//! The transport seam.
//!
//! The boundary layer splits an upgraded connection into a read half
//! ([`FrameSource`]) owned by the lifecycle loop and a write half
//! ([`FrameSink`]) owned by the connection's writer task.

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::frame::Frame;

/// Read half of a client transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next inbound frame. `None` means the stream ended.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Write half of a client transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the transport. Called at most once, by the writer task.
    async fn close(&mut self) -> Result<(), TransportError>;
}
