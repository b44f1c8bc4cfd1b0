//! WAMP Transport Layer
//!
//! This crate provides the connection plumbing the router sits on:
//! - Transport traits ([`TransportSender`], [`TransportReceiver`], [`TransportServer`])
//! - WebSocket server and client (default feature)

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketServer, WebSocketTransport};
