//! Adapters between axum's WebSocket halves and the relay's frame traits.

use std::error::Error as StdError;
use std::io::ErrorKind;

use async_trait::async_trait;
use axum::extract::ws::{self, Message, Utf8Bytes, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parley_core::{CloseFrame, Frame, FrameSink, FrameSource, TransportError};

/// Messages the WebSocket layer reports for a peer that is already gone.
///
/// axum does not re-export its tungstenite error type, so these are matched
/// on the rendered error rather than by downcast.
const PEER_GONE: &[&str] = &[
    "Connection closed normally",
    "Trying to work with closed connection",
    "Connection reset without closing handshake",
];

/// Read half of an upgraded socket.
pub struct WsSource(SplitStream<WebSocket>);

/// Write half of an upgraded socket.
pub struct WsSink(SplitSink<WebSocket, Message>);

/// Split an upgraded socket into the halves the lifecycle consumes.
pub fn split(socket: WebSocket) -> (WsSink, WsSource) {
    let (sink, stream) = socket.split();
    (WsSink(sink), WsSource(stream))
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        let next = self.0.next().await?;
        Some(next.map(from_ws).map_err(classify))
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.0.send(to_ws(frame)).await.map_err(classify)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(classify)
    }
}

/// Convert an inbound axum message.
pub fn from_ws(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(text.into()),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(close) => {
            Frame::Close(close.map(|c| CloseFrame::new(c.code, c.reason.as_str())))
        }
    }
}

/// Convert an outbound frame.
pub fn to_ws(frame: Frame) -> Message {
    match frame {
        Frame::Text(data) => match Utf8Bytes::try_from(data.clone()) {
            Ok(text) => Message::Text(text),
            Err(_) => Message::Binary(data),
        },
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close(close) => Message::Close(close.map(|c| ws::CloseFrame {
            code: c.code,
            reason: Utf8Bytes::from(c.reason),
        })),
    }
}

/// Map an axum socket error onto the relay's transport error classes.
///
/// Peers that vanish without a closing handshake are `Closed`, not faults.
/// The error chain is walked so this holds whichever tungstenite release
/// axum is built against.
pub fn classify(err: axum::Error) -> TransportError {
    let inner = err.into_inner();
    let mut next: Option<&(dyn StdError + 'static)> = Some(&*inner);
    while let Some(e) = next {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return if is_disconnect(io.kind()) {
                TransportError::Closed
            } else {
                TransportError::Io(io.to_string())
            };
        }
        let rendered = e.to_string();
        if PEER_GONE.iter().any(|m| rendered.contains(m)) {
            return TransportError::Closed;
        }
        next = e.source();
    }
    TransportError::Protocol(inner.to_string())
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}
