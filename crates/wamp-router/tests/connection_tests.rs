//! Connection handle tests

use serde_json::json;
use wamp_core::{EventMessage, Message};
use wamp_router::RouterError;
use wamp_test_utils::RecordingSender;

#[test]
fn test_send_message_encodes() {
    let sender = RecordingSender::new();
    let conn = sender.connection("c1");

    conn.send_message(&Message::Event(EventMessage {
        topic: "t".into(),
        event: json!("e"),
    }))
    .unwrap();

    assert_eq!(
        sender.messages(),
        vec![Message::Event(EventMessage {
            topic: "t".into(),
            event: json!("e"),
        })]
    );
}

#[test]
fn test_welcome_message() {
    let sender = RecordingSender::new();
    let conn = sender.connection("abc");
    match conn.welcome_message("srv/1") {
        Message::Welcome(welcome) => {
            assert_eq!(welcome.session_id, "abc");
            assert_eq!(welcome.server_ident, "srv/1");
        }
        other => panic!("expected WELCOME, got {:?}", other),
    }
}

#[test]
fn test_prefixes_are_per_connection() {
    let a = RecordingSender::new().connection("a");
    let b = RecordingSender::new().connection("b");

    a.add_prefix("ex", "http://example.com/");
    assert_eq!(a.resolve_uri("ex:t"), "http://example.com/t");
    assert_eq!(b.resolve_uri("ex:t"), "ex:t");
}

#[test]
fn test_send_after_disconnect_fails() {
    let sender = RecordingSender::new();
    let conn = sender.connection("c1");
    assert!(conn.is_connected());

    sender.disconnect();
    assert!(!conn.is_connected());
    assert!(matches!(
        conn.send_message(&Message::Event(EventMessage {
            topic: "t".into(),
            event: json!(null),
        })),
        Err(RouterError::Transport(_))
    ));
}

#[test]
fn test_connection_identity() {
    let sender = RecordingSender::new();
    let first = sender.connection("same");
    let second = sender.connection("same");
    assert_eq!(*first, *second);
    assert_ne!(*first, *RecordingSender::new().connection("other"));
}
