//! WAMP v1 JSON Codec
//!
//! Every message is a JSON array whose first element is the numeric
//! message type code, e.g. `[5, "http://example.com/topic"]`.

use crate::types::*;
use crate::{Error, Result};
use bytes::Bytes;
use serde_json::Value;

/// Message type codes
pub mod msg {
    pub const WELCOME: u64 = 0;
    pub const PREFIX: u64 = 1;
    pub const CALL: u64 = 2;
    pub const CALL_RESULT: u64 = 3;
    pub const CALL_ERROR: u64 = 4;
    pub const SUBSCRIBE: u64 = 5;
    pub const UNSUBSCRIBE: u64 = 6;
    pub const PUBLISH: u64 = 7;
    pub const EVENT: u64 = 8;
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Encode a message to its JSON text form
pub fn encode(message: &Message) -> Result<Bytes> {
    let array = to_array(message);
    let text = serde_json::to_vec(&array).map_err(|e| Error::EncodeError(e.to_string()))?;
    Ok(Bytes::from(text))
}

/// Decode a message from JSON text
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidJson(e.to_string()))?;
    from_value(value)
}

/// Decode a message from an already parsed JSON value
pub fn from_value(value: Value) -> Result<Message> {
    let items = match value {
        Value::Array(items) if !items.is_empty() => items,
        _ => return Err(Error::NotAnArray),
    };

    let code = items[0].as_u64().ok_or(Error::InvalidTypeCode)?;
    let mut fields = items.into_iter().skip(1);
    let arity = fields.len();

    match code {
        msg::WELCOME => {
            expect_arity("WELCOME", "4", arity, 3..=3)?;
            Ok(Message::Welcome(WelcomeMessage {
                session_id: string_field(fields.next(), "WELCOME", "sessionId")?,
                protocol_version: fields
                    .next()
                    .and_then(|v| v.as_u64())
                    .and_then(|v| u8::try_from(v).ok())
                    .ok_or(Error::InvalidField {
                        kind: "WELCOME",
                        field: "protocolVersion",
                        expected: "a small integer",
                    })?,
                server_ident: string_field(fields.next(), "WELCOME", "serverIdent")?,
            }))
        }

        msg::PREFIX => {
            expect_arity("PREFIX", "3", arity, 2..=2)?;
            Ok(Message::Prefix(PrefixMessage {
                prefix: string_field(fields.next(), "PREFIX", "prefix")?,
                uri: string_field(fields.next(), "PREFIX", "uri")?,
            }))
        }

        msg::CALL => {
            expect_arity("CALL", "at least 3", arity, 2..=usize::MAX)?;
            Ok(Message::Call(CallMessage {
                call_id: string_field(fields.next(), "CALL", "callId")?,
                proc_uri: string_field(fields.next(), "CALL", "procUri")?,
                args: fields.collect(),
            }))
        }

        msg::CALL_RESULT => {
            expect_arity("CALLRESULT", "3", arity, 2..=2)?;
            Ok(Message::CallResult(CallResultMessage {
                call_id: string_field(fields.next(), "CALLRESULT", "callId")?,
                result: fields.next().unwrap_or(Value::Null),
            }))
        }

        msg::CALL_ERROR => {
            expect_arity("CALLERROR", "4 or 5", arity, 3..=4)?;
            let call_id = string_field(fields.next(), "CALLERROR", "callId")?;
            let error_uri = string_field(fields.next(), "CALLERROR", "errorUri")?;
            let error_desc = match fields.next() {
                Some(Value::String(s)) => s,
                Some(Value::Null) => String::new(),
                _ => {
                    return Err(Error::InvalidField {
                        kind: "CALLERROR",
                        field: "errorDesc",
                        expected: "a string",
                    })
                }
            };
            Ok(Message::CallError(CallErrorMessage {
                call_id,
                error_uri,
                error_desc,
                error_details: normalize_details(fields.next()),
            }))
        }

        msg::SUBSCRIBE => {
            expect_arity("SUBSCRIBE", "2", arity, 1..=1)?;
            Ok(Message::Subscribe(SubscribeMessage {
                topic: string_field(fields.next(), "SUBSCRIBE", "topicUri")?,
            }))
        }

        msg::UNSUBSCRIBE => {
            expect_arity("UNSUBSCRIBE", "2", arity, 1..=1)?;
            Ok(Message::Unsubscribe(UnsubscribeMessage {
                topic: string_field(fields.next(), "UNSUBSCRIBE", "topicUri")?,
            }))
        }

        msg::PUBLISH => {
            expect_arity("PUBLISH", "3 to 5", arity, 2..=4)?;
            let topic = string_field(fields.next(), "PUBLISH", "topicUri")?;
            let event = fields.next().unwrap_or(Value::Null);
            let mut publish = PublishMessage {
                topic,
                event,
                ..Default::default()
            };

            match arity {
                3 => match fields.next() {
                    Some(Value::Bool(b)) => publish.exclude_me = b,
                    // Some clients send the exclude list alone
                    Some(list @ Value::Array(_)) => {
                        publish.exclude = session_list(list, "exclude")?;
                    }
                    _ => {
                        return Err(Error::InvalidField {
                            kind: "PUBLISH",
                            field: "excludeMe",
                            expected: "a boolean or a list of session ids",
                        })
                    }
                },
                4 => {
                    publish.exclude = session_list(fields.next().unwrap_or_default(), "exclude")?;
                    publish.eligible =
                        session_list(fields.next().unwrap_or_default(), "eligible")?;
                }
                _ => {}
            }

            Ok(Message::Publish(publish))
        }

        msg::EVENT => {
            expect_arity("EVENT", "3", arity, 2..=2)?;
            Ok(Message::Event(EventMessage {
                topic: string_field(fields.next(), "EVENT", "topicUri")?,
                event: fields.next().unwrap_or(Value::Null),
            }))
        }

        other => Err(Error::UnknownMessageType(other)),
    }
}

/// Convert a message to its JSON array form
pub fn to_array(message: &Message) -> Value {
    let items = match message {
        Message::Welcome(m) => vec![
            Value::from(msg::WELCOME),
            Value::from(m.session_id.as_str()),
            Value::from(m.protocol_version),
            Value::from(m.server_ident.as_str()),
        ],
        Message::Prefix(m) => vec![
            Value::from(msg::PREFIX),
            Value::from(m.prefix.as_str()),
            Value::from(m.uri.as_str()),
        ],
        Message::Call(m) => {
            let mut items = Vec::with_capacity(3 + m.args.len());
            items.push(Value::from(msg::CALL));
            items.push(Value::from(m.call_id.as_str()));
            items.push(Value::from(m.proc_uri.as_str()));
            items.extend(m.args.iter().cloned());
            items
        }
        Message::CallResult(m) => vec![
            Value::from(msg::CALL_RESULT),
            Value::from(m.call_id.as_str()),
            m.result.clone(),
        ],
        Message::CallError(m) => vec![
            Value::from(msg::CALL_ERROR),
            Value::from(m.call_id.as_str()),
            Value::from(m.error_uri.as_str()),
            Value::from(m.error_desc.as_str()),
            normalize_details(Some(m.error_details.clone())),
        ],
        Message::Subscribe(m) => vec![Value::from(msg::SUBSCRIBE), Value::from(m.topic.as_str())],
        Message::Unsubscribe(m) => {
            vec![Value::from(msg::UNSUBSCRIBE), Value::from(m.topic.as_str())]
        }
        Message::Publish(m) => {
            let mut items = vec![
                Value::from(msg::PUBLISH),
                Value::from(m.topic.as_str()),
                m.event.clone(),
            ];
            if !m.exclude.is_empty() || !m.eligible.is_empty() {
                items.push(Value::from(m.exclude.clone()));
                items.push(Value::from(m.eligible.clone()));
            } else if m.exclude_me {
                items.push(Value::Bool(true));
            }
            items
        }
        Message::Event(m) => vec![
            Value::from(msg::EVENT),
            Value::from(m.topic.as_str()),
            m.event.clone(),
        ],
    };

    Value::Array(items)
}

// ============================================================================
// HELPERS
// ============================================================================

fn expect_arity(
    kind: &'static str,
    expected: &'static str,
    actual: usize,
    range: std::ops::RangeInclusive<usize>,
) -> Result<()> {
    if range.contains(&actual) {
        Ok(())
    } else {
        // Report the full element count, type code included
        Err(Error::WrongArity {
            kind,
            expected,
            actual: actual + 1,
        })
    }
}

fn string_field(value: Option<Value>, kind: &'static str, field: &'static str) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(Error::InvalidField {
            kind,
            field,
            expected: "a string",
        }),
    }
}

fn session_list(value: Value, field: &'static str) -> Result<Vec<SessionId>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(Error::InvalidField {
                    kind: "PUBLISH",
                    field,
                    expected: "a list of session id strings",
                }),
            })
            .collect(),
        _ => Err(Error::InvalidField {
            kind: "PUBLISH",
            field,
            expected: "a list of session id strings",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_subscribe() {
        let msg = decode(br#"[5, "http://example.com/simple"]"#).unwrap();
        assert_eq!(
            msg,
            Message::Subscribe(SubscribeMessage {
                topic: "http://example.com/simple".to_string()
            })
        );
    }

    #[test]
    fn test_decode_publish_forms() {
        let short = decode(br#"[7, "t", "hello"]"#).unwrap();
        let Message::Publish(p) = short else {
            panic!("expected publish")
        };
        assert!(!p.exclude_me);
        assert!(p.exclude.is_empty() && p.eligible.is_empty());

        let exclude_me = decode(br#"[7, "t", {"a": 1}, true]"#).unwrap();
        let Message::Publish(p) = exclude_me else {
            panic!("expected publish")
        };
        assert!(p.exclude_me);
        assert_eq!(p.event, json!({"a": 1}));

        let lists = decode(br#"[7, "t", "x", ["s1"], ["s2", "s3"]]"#).unwrap();
        let Message::Publish(p) = lists else {
            panic!("expected publish")
        };
        assert_eq!(p.exclude, vec!["s1"]);
        assert_eq!(p.eligible, vec!["s2", "s3"]);
    }

    #[test]
    fn test_call_error_null_details_normalized() {
        let msg = decode(br#"[4, "42", "http://example.com/error", "bad", null]"#).unwrap();
        let Message::CallError(err) = msg else {
            panic!("expected callerror")
        };
        assert_eq!(err.error_details, json!({}));

        let encoded = encode(&Message::CallError(CallErrorMessage {
            call_id: "42".into(),
            error_uri: "http://example.com/error".into(),
            error_desc: String::new(),
            error_details: Value::Null,
        }))
        .unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value, json!([4, "42", "http://example.com/error", "", {}]));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode(b"not json"), Err(Error::InvalidJson(_))));
        assert!(matches!(decode(b"{}"), Err(Error::NotAnArray)));
        assert!(matches!(decode(b"[]"), Err(Error::NotAnArray)));
        assert!(matches!(decode(br#"["x"]"#), Err(Error::InvalidTypeCode)));
        assert!(matches!(decode(b"[42]"), Err(Error::UnknownMessageType(42))));
        assert!(matches!(
            decode(b"[5]"),
            Err(Error::WrongArity { actual: 1, .. })
        ));
        assert!(matches!(
            decode(b"[5, 17]"),
            Err(Error::InvalidField { field: "topicUri", .. })
        ));
    }
}
