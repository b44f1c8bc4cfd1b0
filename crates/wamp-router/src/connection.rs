//! Connection handles

use bytes::Bytes;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;
use wamp_core::{codec, Message, PrefixMap, SessionId, WelcomeMessage, PROTOCOL_VERSION};
use wamp_transport::TransportSender;

use crate::error::Result;

/// One logical client session.
///
/// The transport owns the socket; the router keeps this handle only while the
/// connection is open and never closes the transport itself.
pub struct Connection {
    /// Unique session ID, stable for the connection's lifetime
    pub id: SessionId,
    /// Peer address, when the transport knows it
    pub remote_addr: Option<SocketAddr>,
    /// Transport sender for this session
    sender: Arc<dyn TransportSender>,
    /// CURIE prefixes registered with PREFIX
    prefixes: RwLock<PrefixMap>,
    /// Session creation time
    pub created_at: Instant,
}

impl Connection {
    /// Create a connection with a fresh random session id
    pub fn new(sender: Arc<dyn TransportSender>) -> Self {
        Self::with_id(Uuid::new_v4().simple().to_string(), sender)
    }

    /// Create a connection with a known session id
    pub fn with_id(id: impl Into<SessionId>, sender: Arc<dyn TransportSender>) -> Self {
        Self {
            id: id.into(),
            remote_addr: None,
            sender,
            prefixes: RwLock::new(PrefixMap::new()),
            created_at: Instant::now(),
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Queue pre-encoded data without waiting on the socket
    pub fn send_bytes(&self, data: Bytes) -> Result<()> {
        self.sender.try_send(data)?;
        Ok(())
    }

    /// Encode and queue a message
    pub fn send_message(&self, message: &Message) -> Result<()> {
        let data = codec::encode(message)?;
        self.send_bytes(data)
    }

    /// WELCOME message for this session
    pub fn welcome_message(&self, server_ident: &str) -> Message {
        Message::Welcome(WelcomeMessage {
            session_id: self.id.clone(),
            protocol_version: PROTOCOL_VERSION,
            server_ident: server_ident.to_string(),
        })
    }

    /// Register a CURIE prefix
    pub fn add_prefix(&self, prefix: &str, uri: &str) {
        self.prefixes.write().insert(prefix, uri);
    }

    /// Expand a CURIE using this session's prefixes
    pub fn resolve_uri(&self, curie_or_uri: &str) -> String {
        self.prefixes.read().resolve(curie_or_uri)
    }

    /// Check if the transport still reports the connection open
    pub fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl std::hash::Hash for Connection {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("prefixes", &self.prefixes.read().len())
            .finish()
    }
}
