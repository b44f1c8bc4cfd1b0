//! Errors raised by the connection layer under the router

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Listener bind or outbound connect failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer went away, or the server stopped accepting
    #[error("connection closed")]
    ConnectionClosed,

    /// Peer did not complete the WebSocket upgrade in time
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Peer sent an upgrade request the server could not accept
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    /// The session's outbound queue is at capacity; the frame was dropped
    #[error("send queue full")]
    QueueFull,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Send attempted on a session whose socket already closed
    #[error("not connected")]
    NotConnected,

    #[error("websocket error: {0}")]
    WebSocket(String),
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(e.to_string())
    }
}
