//! Transport-level frames.

use bytes::Bytes;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (tab closed, server restart).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Policy violation: a refused duplicate join, or a connection the server
/// closes because it was displaced or timed out.
pub const CLOSE_POLICY: u16 = 1008;

/// Close frame payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close status code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseFrame {
    /// Build a close frame.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal and going-away closures are routine.
    pub fn is_expected(&self) -> bool {
        matches!(self.code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
    }
}

/// One frame received from or sent to a client.
///
/// Payloads are reference counted so fan-out clones pointers, not bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Text payload. Always valid UTF-8.
    Text(Bytes),
    /// Binary payload.
    Binary(Bytes),
    /// Ping control frame.
    Ping(Bytes),
    /// Pong control frame.
    Pong(Bytes),
    /// Close control frame.
    Close(Option<CloseFrame>),
}

/// Routing class of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Text data frame.
    Text,
    /// Binary data frame.
    Binary,
    /// Ping, pong or close. Never routed.
    Control,
}

impl FrameKind {
    /// Label used for metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Control => "control",
        }
    }
}

impl Frame {
    /// Text frame from anything string-like.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(Bytes::from(text.into()))
    }

    /// Text frame over bytes already known to be UTF-8.
    pub fn text_from_utf8(data: Bytes) -> Result<Self, std::str::Utf8Error> {
        let _ = std::str::from_utf8(&data)?;
        Ok(Self::Text(data))
    }

    /// Binary frame from anything byte-like.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Routing class.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Text(_) => FrameKind::Text,
            Self::Binary(_) => FrameKind::Binary,
            Self::Ping(_) | Self::Pong(_) | Self::Close(_) => FrameKind::Control,
        }
    }

    /// Raw payload bytes. Close frames have none.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Text(b) | Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => b,
            Self::Close(_) => &[],
        }
    }

    /// Whether this is a data frame that the router may forward.
    pub fn is_data(&self) -> bool {
        self.kind() != FrameKind::Control
    }
}
