//! WAMP Core
//!
//! Core types, encoding, and protocol primitives for WAMP v1
//! (WebSocket Application Messaging Protocol).
//!
//! This crate provides:
//! - Protocol message types ([`Message`], [`MessageType`])
//! - JSON array encoding/decoding ([`codec`])
//! - CURIE prefix expansion ([`PrefixMap`])
//! - Server-originated error URIs ([`error_uri`])

pub mod codec;
pub mod error;
pub mod prefix;
pub mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use prefix::PrefixMap;
pub use types::*;

/// Protocol version announced in WELCOME
pub const PROTOCOL_VERSION: u8 = 1;

/// Default WebSocket port
pub const DEFAULT_WS_PORT: u16 = 8080;

/// WebSocket subprotocol identifier
pub const WS_SUBPROTOCOL: &str = "wamp";

/// Server identification sent in WELCOME
pub const SERVER_IDENT: &str = concat!("wamp-router/", env!("CARGO_PKG_VERSION"));

/// Error URIs for CALLERROR messages the router produces on its own behalf
pub mod error_uri {
    /// No RPC handler accepts the procedure
    pub const NO_SUCH_PROCEDURE: &str = "http://wamp.ws/error#nosuchprocedure";
    /// The call stayed pending longer than the configured timeout
    pub const CALL_TIMEOUT: &str = "http://wamp.ws/error#timeout";
    /// The procedure handler failed without a more specific error
    pub const INTERNAL_ERROR: &str = "http://wamp.ws/error#internal";
}
