//! Seams between the router and the sockets it serves
//!
//! A connection is split in two halves: a [`TransportSender`] the router
//! shares across tasks for outbound WAMP frames, and a [`TransportReceiver`]
//! owned by the session's read loop.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

use crate::error::Result;

/// What a session's read loop observes
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Upgrade finished; first event on every connection
    Connected,
    /// Peer closed or the socket failed. No events follow.
    Disconnected { reason: Option<String> },
    /// One inbound frame, still encoded
    Data(Bytes),
    Error(String),
}

/// Outbound half of a connection.
///
/// Frames are queued, not written inline, so callers never wait on the
/// peer's socket unless they ask to with [`send`](Self::send).
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Queue a frame, waiting while the queue is full
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Queue a frame or give up immediately.
    ///
    /// Fails with [`TransportError::QueueFull`](crate::TransportError::QueueFull)
    /// when the queue has no room; the frame is dropped. Fan-out uses this
    /// so one slow subscriber cannot hold up a publish.
    fn try_send(&self, data: Bytes) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Start a clean close of the connection
    async fn close(&self) -> Result<()>;
}

/// Inbound half of a connection
#[async_trait]
pub trait TransportReceiver: Send {
    /// Next event, or `None` once the connection is gone
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Dials a router; used by clients, tests and tooling
#[async_trait]
pub trait Transport: Send + Sync {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    async fn connect(addr: &str) -> Result<(Self::Sender, Self::Receiver)>
    where
        Self: Sized;
}

/// Listener the router pulls new sessions from
#[async_trait]
pub trait TransportServer: Send + Sync {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    /// Wait for the next connection that has finished its handshake.
    ///
    /// A peer stuck mid-handshake must not delay connections behind it.
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)>;

    fn local_addr(&self) -> Result<SocketAddr>;

    /// Stop accepting. Sessions already handed out are unaffected.
    async fn close(&self) -> Result<()>;
}
