//! Protocol types and message definitions

use serde_json::{Map, Value};

/// Session identifier assigned by the server in WELCOME
pub type SessionId = String;

/// Caller-supplied RPC call identifier, echoed back verbatim
pub type CallId = String;

/// Message type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Welcome = 0,
    Prefix = 1,
    Call = 2,
    CallResult = 3,
    CallError = 4,
    Subscribe = 5,
    Unsubscribe = 6,
    Publish = 7,
    Event = 8,
}

impl MessageType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(MessageType::Welcome),
            1 => Some(MessageType::Prefix),
            2 => Some(MessageType::Call),
            3 => Some(MessageType::CallResult),
            4 => Some(MessageType::CallError),
            5 => Some(MessageType::Subscribe),
            6 => Some(MessageType::Unsubscribe),
            7 => Some(MessageType::Publish),
            8 => Some(MessageType::Event),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Welcome => "WELCOME",
            MessageType::Prefix => "PREFIX",
            MessageType::Call => "CALL",
            MessageType::CallResult => "CALLRESULT",
            MessageType::CallError => "CALLERROR",
            MessageType::Subscribe => "SUBSCRIBE",
            MessageType::Unsubscribe => "UNSUBSCRIBE",
            MessageType::Publish => "PUBLISH",
            MessageType::Event => "EVENT",
        }
    }
}

/// All WAMP v1 messages
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Welcome(WelcomeMessage),
    Prefix(PrefixMessage),
    Call(CallMessage),
    CallResult(CallResultMessage),
    CallError(CallErrorMessage),
    Subscribe(SubscribeMessage),
    Unsubscribe(UnsubscribeMessage),
    Publish(PublishMessage),
    Event(EventMessage),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Welcome(_) => MessageType::Welcome,
            Message::Prefix(_) => MessageType::Prefix,
            Message::Call(_) => MessageType::Call,
            Message::CallResult(_) => MessageType::CallResult,
            Message::CallError(_) => MessageType::CallError,
            Message::Subscribe(_) => MessageType::Subscribe,
            Message::Unsubscribe(_) => MessageType::Unsubscribe,
            Message::Publish(_) => MessageType::Publish,
            Message::Event(_) => MessageType::Event,
        }
    }

    /// The topic or procedure URI this message refers to, if any
    pub fn uri(&self) -> Option<&str> {
        match self {
            Message::Prefix(m) => Some(&m.uri),
            Message::Call(m) => Some(&m.proc_uri),
            Message::Subscribe(m) => Some(&m.topic),
            Message::Unsubscribe(m) => Some(&m.topic),
            Message::Publish(m) => Some(&m.topic),
            Message::Event(m) => Some(&m.topic),
            _ => None,
        }
    }
}

/// WELCOME: first message sent by the server on a new connection
#[derive(Debug, Clone, PartialEq)]
pub struct WelcomeMessage {
    pub session_id: SessionId,
    pub protocol_version: u8,
    pub server_ident: String,
}

/// PREFIX: registers a CURIE prefix for the rest of the session
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixMessage {
    pub prefix: String,
    pub uri: String,
}

/// CALL: RPC request
#[derive(Debug, Clone, PartialEq)]
pub struct CallMessage {
    pub call_id: CallId,
    pub proc_uri: String,
    pub args: Vec<Value>,
}

/// CALLRESULT: successful RPC response
#[derive(Debug, Clone, PartialEq)]
pub struct CallResultMessage {
    pub call_id: CallId,
    pub result: Value,
}

/// CALLERROR: failed RPC response
///
/// `error_desc` is always transmitted (possibly empty) and `error_details`
/// is always a structured value, `{}` when nothing more is known.
#[derive(Debug, Clone, PartialEq)]
pub struct CallErrorMessage {
    pub call_id: CallId,
    pub error_uri: String,
    pub error_desc: String,
    pub error_details: Value,
}

impl CallErrorMessage {
    /// Build a CALLERROR, substituting `{}` for missing or null details
    pub fn new(
        call_id: impl Into<CallId>,
        error_uri: impl Into<String>,
        error_desc: impl Into<String>,
        error_details: Option<Value>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            error_uri: error_uri.into(),
            error_desc: error_desc.into(),
            error_details: normalize_details(error_details),
        }
    }
}

/// Replace absent or null error details with an empty object
pub fn normalize_details(details: Option<Value>) -> Value {
    match details {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v) => v,
    }
}

/// SUBSCRIBE
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeMessage {
    pub topic: String,
}

/// UNSUBSCRIBE
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribeMessage {
    pub topic: String,
}

/// PUBLISH
///
/// The short form `[7, topic, event, true]` sets `exclude_me`; resolving
/// it to the publisher's session id is left to whoever knows the sender.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishMessage {
    pub topic: String,
    pub event: Value,
    pub exclude_me: bool,
    pub exclude: Vec<SessionId>,
    pub eligible: Vec<SessionId>,
}

/// EVENT: delivered to each resolved subscriber of a PUBLISH
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub topic: String,
    pub event: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_roundtrip() {
        for code in 0..=8u8 {
            let ty = MessageType::from_u8(code).unwrap();
            assert_eq!(ty as u8, code);
        }
        assert!(MessageType::from_u8(9).is_none());
    }

    #[test]
    fn test_normalize_details() {
        assert_eq!(normalize_details(None), json!({}));
        assert_eq!(normalize_details(Some(Value::Null)), json!({}));
        assert_eq!(normalize_details(Some(json!([1, 2]))), json!([1, 2]));
    }

    #[test]
    fn test_call_error_new() {
        let err = CallErrorMessage::new("7", "http://example.com/err#x", "", None);
        assert_eq!(err.error_details, json!({}));
        assert_eq!(err.error_desc, "");
    }
}
