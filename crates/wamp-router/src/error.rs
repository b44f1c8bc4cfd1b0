//! Router error types

use thiserror::Error;

use wamp_core::{CallId, SessionId};

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    /// A CALL reused an id that is still awaiting its result
    #[error("duplicate call id: {0}")]
    DuplicateCallId(CallId),

    /// A CALLRESULT/CALLERROR matched no pending call
    #[error("unknown call id: {0}")]
    UnknownCallId(CallId),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] wamp_transport::TransportError),

    #[error("core protocol error: {0}")]
    Core(#[from] wamp_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    /// Errors that only affect a single message, never the connection
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RouterError::DuplicateCallId(_)
                | RouterError::UnknownCallId(_)
                | RouterError::InvalidMessage(_)
                | RouterError::Core(_)
        )
    }
}
