//! Error types for WAMP core

use thiserror::Error;

/// Result type alias for WAMP core operations
pub type Result<T> = std::result::Result<T, Error>;

/// WAMP core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Frame is not valid JSON
    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// Frame is valid JSON but not a message array
    #[error("message must be a non-empty json array")]
    NotAnArray,

    /// First element is not an integer type code
    #[error("missing or invalid message type code")]
    InvalidTypeCode,

    /// Type code is not a WAMP v1 message
    #[error("unknown message type: {0}")]
    UnknownMessageType(u64),

    /// Element count does not fit the message type
    #[error("{kind} expects {expected} elements, got {actual}")]
    WrongArity {
        kind: &'static str,
        expected: &'static str,
        actual: usize,
    },

    /// Element has the wrong json type
    #[error("{kind}: field `{field}` must be {expected}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    /// JSON encoding error
    #[error("encode error: {0}")]
    EncodeError(String),
}
