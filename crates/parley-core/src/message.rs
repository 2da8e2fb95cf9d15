//! Routing envelope and inbound message.
//!
//! Clients send JSON objects such as
//! `{"type": "offer", "from": "<id>", "to": "<id>|*", "data": {...}}`.
//! Only `to` matters for routing and `from` for diagnostics; everything else
//! is payload the relay never looks at.

use serde::Deserialize;

use crate::frame::{Frame, FrameKind};
use crate::ids::ClientId;

/// Target value meaning "every other member of the sender's group".
pub const BROADCAST_TARGET: &str = "*";

/// Routing fields decoded from a data frame.
///
/// Missing fields decode as empty strings and unknown fields are ignored, so
/// a client that sends extra metadata still routes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Identifier the client claims to be.
    pub from: String,
    /// Recipient identifier or [`BROADCAST_TARGET`].
    pub to: String,
}

impl Envelope {
    /// Decode the routing fields from a payload.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Decode, falling back to the zero envelope on malformed input.
    ///
    /// The zero envelope has an empty `to`, which no registered client
    /// matches, so the message is dropped by the router.
    pub fn decode_lossy(payload: &[u8]) -> Self {
        match Self::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, len = payload.len(), "undecodable envelope");
                Self::default()
            }
        }
    }

    /// Routing target named by `to`.
    pub fn target(&self) -> Target {
        Target::parse(&self.to)
    }
}

/// Where a message should go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Every other member of the group.
    Broadcast,
    /// One specific member.
    Peer(ClientId),
}

impl Target {
    /// Interpret a raw `to` value.
    pub fn parse(to: &str) -> Self {
        if to == BROADCAST_TARGET {
            Self::Broadcast
        } else {
            Self::Peer(ClientId::from(to))
        }
    }
}

/// An inbound frame plus the routing metadata the router needs.
#[derive(Clone, Debug)]
pub struct Message {
    /// Identifier of the connection the frame arrived on.
    pub sender: ClientId,
    /// Decoded routing target.
    pub target: Target,
    /// The frame exactly as received; forwarded without re-encoding.
    pub frame: Frame,
}

impl Message {
    /// Build a message from a received frame.
    ///
    /// Data frames have their envelope decoded; control frames get an empty
    /// peer target and are ignored by the router anyway.
    pub fn from_frame(sender: ClientId, frame: Frame) -> Self {
        let envelope = if frame.is_data() {
            Envelope::decode_lossy(frame.payload())
        } else {
            Envelope::default()
        };
        if !envelope.from.is_empty() && envelope.from != sender.as_str() {
            tracing::debug!(
                sender = %sender,
                claimed = %envelope.from,
                "envelope sender differs from connection identity"
            );
        }
        Self {
            sender,
            target: envelope.target(),
            frame,
        }
    }

    /// Routing class of the underlying frame.
    pub fn kind(&self) -> FrameKind {
        self.frame.kind()
    }
}
