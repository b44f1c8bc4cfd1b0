//! WebSocket transport tests

use bytes::Bytes;
use std::time::Duration;
use tokio::time::timeout;
use wamp_transport::{
    Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
    TransportServer, WebSocketConfig, WebSocketServer, WebSocketTransport,
};

async fn next_data(receiver: &mut impl TransportReceiver) -> Option<Bytes> {
    timeout(Duration::from_secs(2), async {
        loop {
            match receiver.recv().await {
                Some(TransportEvent::Data(data)) => return Some(data),
                Some(TransportEvent::Connected) => continue,
                _ => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test]
async fn test_server_client_exchange() {
    let mut server = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    let accept = tokio::spawn(async move { server.accept().await.unwrap() });

    let (client_tx, mut client_rx) = WebSocketTransport::connect(&format!("ws://{}", addr))
        .await
        .unwrap();
    let (server_tx, mut server_rx, _) = accept.await.unwrap();

    client_tx
        .send(Bytes::from_static(br#"[5,"http://example.com/t"]"#))
        .await
        .unwrap();
    let received = next_data(&mut server_rx).await.expect("server got nothing");
    assert_eq!(&received[..], br#"[5,"http://example.com/t"]"#);

    server_tx
        .try_send(Bytes::from_static(br#"[8,"http://example.com/t","hi"]"#))
        .unwrap();
    let received = next_data(&mut client_rx).await.expect("client got nothing");
    assert_eq!(&received[..], br#"[8,"http://example.com/t","hi"]"#);
}

#[tokio::test]
async fn test_disconnect_reported() {
    let mut server = WebSocketServer::bind("127.0.0.1:0")
        .await
        .unwrap()
        .with_config(WebSocketConfig::default());
    let addr = server.local_addr().unwrap();

    let accept = tokio::spawn(async move { server.accept().await.unwrap() });
    let (client_tx, _client_rx) = WebSocketTransport::connect(&format!("ws://{}", addr))
        .await
        .unwrap();
    let (_server_tx, mut server_rx, _) = accept.await.unwrap();

    client_tx.close().await.unwrap();
    assert!(!client_tx.is_connected());
    assert!(matches!(
        client_tx.try_send(Bytes::from_static(b"[]")),
        Err(TransportError::NotConnected)
    ));

    let disconnected = timeout(Duration::from_secs(2), async {
        loop {
            match server_rx.recv().await {
                Some(TransportEvent::Disconnected { .. }) | None => return true,
                _ => continue,
            }
        }
    })
    .await;
    assert!(matches!(disconnected, Ok(true)));
}

#[tokio::test]
async fn test_stalled_handshake_does_not_block_accept() {
    let mut server = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    // Connects at the TCP level and never sends the upgrade request
    let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();

    let accept = tokio::spawn(async move { server.accept().await.unwrap() });
    let (_client_tx, _client_rx) = WebSocketTransport::connect(&format!("ws://{}", addr))
        .await
        .unwrap();

    let accepted = timeout(Duration::from_secs(2), accept).await;
    assert!(matches!(accepted, Ok(Ok(_))), "accept waited on the silent peer");
}

#[tokio::test]
async fn test_silent_peer_dropped_after_handshake_timeout() {
    use tokio::io::AsyncReadExt;

    let mut server = WebSocketServer::bind("127.0.0.1:0")
        .await
        .unwrap()
        .with_config(WebSocketConfig {
            handshake_timeout: Duration::from_millis(100),
            ..Default::default()
        });
    let addr = server.local_addr().unwrap();
    let _accept = tokio::spawn(async move { server.accept().await });

    let mut silent = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = timeout(Duration::from_secs(2), silent.read(&mut buf)).await;
    assert!(
        matches!(read, Ok(Ok(0)) | Ok(Err(_))),
        "silent peer was not disconnected: {:?}",
        read
    );
}
