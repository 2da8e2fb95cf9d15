//! Relay error types.

use thiserror::Error;

use crate::ids::{ClientId, GroupCode};

/// Failure reading from or writing to a client transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer went away, possibly without a closing handshake.
    #[error("connection closed")]
    Closed,
    /// The peer violated the protocol (bad framing, oversize message).
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether this is an ordinary disconnect rather than a fault worth logging.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The identifier is already registered in the group and the policy
    /// forbids replacing it.
    #[error("client {client} is already connected to group {group}")]
    DuplicateClient {
        /// Group the join targeted.
        group: GroupCode,
        /// Identifier that is already present.
        client: ClientId,
    },
}
