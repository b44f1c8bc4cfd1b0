//! Codec tests for WAMP core

use serde_json::{json, Value};
use wamp_core::{
    codec, CallErrorMessage, CallMessage, CallResultMessage, EventMessage, Message,
    PublishMessage, WelcomeMessage, PROTOCOL_VERSION,
};

fn as_json(msg: &Message) -> Value {
    let encoded = codec::encode(msg).expect("encode failed");
    serde_json::from_slice(&encoded).expect("encoded frame is not json")
}

#[test]
fn test_encode_welcome() {
    let msg = Message::Welcome(WelcomeMessage {
        session_id: "sess-123".to_string(),
        protocol_version: PROTOCOL_VERSION,
        server_ident: "test/1.0".to_string(),
    });

    assert_eq!(as_json(&msg), json!([0, "sess-123", 1, "test/1.0"]));
}

#[test]
fn test_decode_call_with_args() {
    let decoded = codec::decode(br#"[2, "7DK6TdN4wLiUJgNM", "http://example.com/api#add", 23, 99]"#)
        .expect("decode failed");

    match decoded {
        Message::Call(call) => {
            assert_eq!(call.call_id, "7DK6TdN4wLiUJgNM");
            assert_eq!(call.proc_uri, "http://example.com/api#add");
            assert_eq!(call.args, vec![json!(23), json!(99)]);
        }
        _ => panic!("Expected Call message"),
    }
}

#[test]
fn test_decode_call_without_args() {
    let decoded = codec::decode(br#"[2, "1", "calc:now"]"#).expect("decode failed");
    match decoded {
        Message::Call(CallMessage { args, .. }) => assert!(args.is_empty()),
        _ => panic!("Expected Call message"),
    }
}

#[test]
fn test_encode_call_result_echoes_id() {
    let msg = Message::CallResult(CallResultMessage {
        call_id: "CcDnuI2bl2oLGBzO".to_string(),
        result: json!({"sum": 122}),
    });

    assert_eq!(as_json(&msg), json!([3, "CcDnuI2bl2oLGBzO", {"sum": 122}]));
}

#[test]
fn test_encode_call_error_always_has_details() {
    let msg = Message::CallError(CallErrorMessage::new(
        "gwbN3EDtFv6JvNV5",
        "http://autobahn.tavendo.com/error#generic",
        "math domain error",
        None,
    ));

    assert_eq!(
        as_json(&msg),
        json!([
            4,
            "gwbN3EDtFv6JvNV5",
            "http://autobahn.tavendo.com/error#generic",
            "math domain error",
            {}
        ])
    );
}

#[test]
fn test_decode_call_error_without_details() {
    let decoded = codec::decode(br#"[4, "1", "http://example.com/e", ""]"#).expect("decode failed");
    match decoded {
        Message::CallError(err) => {
            assert_eq!(err.error_desc, "");
            assert_eq!(err.error_details, json!({}));
        }
        _ => panic!("Expected CallError message"),
    }
}

#[test]
fn test_encode_event() {
    let msg = Message::Event(EventMessage {
        topic: "http://example.com/simple".to_string(),
        event: json!("Hello, I am a simple event."),
    });

    assert_eq!(
        as_json(&msg),
        json!([8, "http://example.com/simple", "Hello, I am a simple event."])
    );
}

#[test]
fn test_publish_encoding_picks_shortest_form() {
    let plain = Message::Publish(PublishMessage {
        topic: "t".into(),
        event: json!("e"),
        ..Default::default()
    });
    assert_eq!(as_json(&plain), json!([7, "t", "e"]));

    let exclude_me = Message::Publish(PublishMessage {
        topic: "t".into(),
        event: json!("e"),
        exclude_me: true,
        ..Default::default()
    });
    assert_eq!(as_json(&exclude_me), json!([7, "t", "e", true]));

    let filtered = Message::Publish(PublishMessage {
        topic: "t".into(),
        event: json!("e"),
        exclude: vec!["a".into()],
        eligible: vec![],
        ..Default::default()
    });
    assert_eq!(as_json(&filtered), json!([7, "t", "e", ["a"], []]));
}

#[test]
fn test_decode_publish_rejects_non_string_sessions() {
    let result = codec::decode(br#"[7, "t", "e", [1, 2], []]"#);
    assert!(result.is_err());
}

#[test]
fn test_uri_accessor() {
    let decoded = codec::decode(br#"[6, "http://example.com/t"]"#).unwrap();
    assert_eq!(decoded.uri(), Some("http://example.com/t"));
    assert_eq!(decoded.message_type().name(), "UNSUBSCRIBE");
}
