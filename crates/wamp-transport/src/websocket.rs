//! WebSocket transport implementation
//!
//! WAMP v1 frames are JSON text, so outbound data goes out as text frames.
//! Inbound text and binary frames are both surfaced as [`TransportEvent::Data`].

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::server::{Request as HsRequest, Response as HsResponse},
        http::HeaderValue,
        protocol::{Message as WsMessage, WebSocketConfig as TungsteniteConfig},
    },
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer};

use wamp_core::WS_SUBPROTOCOL;

/// Handshaken connections buffered ahead of `accept`
const ACCEPT_BACKLOG: usize = 64;
/// Pause after a failed TCP accept (e.g. out of file descriptors)
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Subprotocol to use
    pub subprotocol: String,
    /// Maximum message size
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before `try_send` drops
    pub send_queue_capacity: usize,
    /// Time a new peer has to complete the upgrade handshake
    pub handshake_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            subprotocol: WS_SUBPROTOCOL.to_string(),
            max_message_size: 64 * 1024, // 64KB
            send_queue_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket client transport
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            config: WebSocketConfig::default(),
        }
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

fn to_frame(data: Bytes) -> WsMessage {
    match String::from_utf8(data.to_vec()) {
        Ok(text) => WsMessage::Text(text),
        Err(e) => WsMessage::Binary(e.into_bytes()),
    }
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(to_frame(data))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn try_send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx.try_send(to_frame(data)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::ConnectionClosed,
        })
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Split a websocket stream into a sender/receiver pair backed by reader and writer tasks
fn spawn_connection<S>(
    ws_stream: WebSocketStream<S>,
    send_queue_capacity: usize,
) -> (WebSocketSender, WebSocketReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(send_queue_capacity.max(1));
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(100);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    // Writer task
    tokio::spawn(async move {
        loop {
            match send_rx.recv().await {
                Some(msg) => {
                    let closing = matches!(msg, WsMessage::Close(_));
                    if let Err(e) = write.send(msg).await {
                        error!("WebSocket write error: {}", e);
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                // Every sender handle dropped: start the closing handshake
                None => {
                    let _ = write.close().await;
                    break;
                }
            }
        }
        *connected_write.lock() = false;
    });

    // Reader task
    tokio::spawn(async move {
        let _ = event_tx.send(TransportEvent::Connected).await;

        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    let _ = event_tx.send(TransportEvent::Data(Bytes::from(text))).await;
                }
                Ok(WsMessage::Binary(data)) => {
                    let _ = event_tx.send(TransportEvent::Data(Bytes::from(data))).await;
                }
                Ok(WsMessage::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    debug!("WebSocket closed: {:?}", reason);
                    let _ = event_tx.send(TransportEvent::Disconnected { reason }).await;
                    break;
                }
                // Ping/pong is answered by tungstenite
                Ok(_) => {}
                Err(e) => {
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    let _ = event_tx
                        .send(TransportEvent::Disconnected {
                            reason: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
        }

        *connected_read.lock() = false;
    });

    let sender = WebSocketSender {
        tx: send_tx,
        connected,
    };
    let receiver = WebSocketReceiver { rx: event_rx };

    (sender, receiver)
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        info!("Connecting to WebSocket: {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(WS_SUBPROTOCOL),
        );

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        Ok(spawn_connection(
            ws_stream,
            WebSocketConfig::default().send_queue_capacity,
        ))
    }
}

/// A finished handshake waiting for [`TransportServer::accept`]
type Accepted = (WebSocketSender, WebSocketReceiver, SocketAddr);

/// WebSocket server
///
/// TCP accepts run on a background task and every upgrade handshake runs on
/// its own task under [`WebSocketConfig::handshake_timeout`]. A peer that
/// connects and never upgrades only ties up its own task; `accept` yields
/// connections in the order their handshakes finish.
pub struct WebSocketServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: WebSocketConfig,
    ready: Option<mpsc::Receiver<Accepted>>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let local_addr = listener.local_addr()?;

        info!("WebSocket server listening on {}", local_addr);

        Ok(Self {
            listener: Some(listener),
            local_addr,
            config: WebSocketConfig::default(),
            ready: None,
            acceptor: Mutex::new(None),
        })
    }

    /// Replace the configuration. The acceptor captures it on the first
    /// `accept`, so set it before serving.
    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }

    fn start_acceptor(&mut self) -> Result<mpsc::Receiver<Accepted>> {
        let listener = self.listener.take().ok_or(TransportError::ConnectionClosed)?;
        let (ready_tx, ready_rx) = mpsc::channel(ACCEPT_BACKLOG);
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            loop {
                let (stream, addr) = tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("TCP accept failed: {}", e);
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                            continue;
                        }
                    },
                    _ = ready_tx.closed() => break,
                };
                debug!("Accepted TCP connection from {}", addr);

                let ready_tx = ready_tx.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    let ws_stream = match handshake(stream, &config).await {
                        Ok(ws_stream) => ws_stream,
                        Err(e) => {
                            warn!("WebSocket handshake with {} failed: {}", addr, e);
                            return;
                        }
                    };
                    info!("WebSocket client connected from {}", addr);

                    let (sender, receiver) =
                        spawn_connection(ws_stream, config.send_queue_capacity);
                    if ready_tx.send((sender, receiver, addr)).await.is_err() {
                        debug!("Server closed before {} was accepted", addr);
                    }
                });
            }
        });

        *self.acceptor.lock() = Some(handle);
        Ok(ready_rx)
    }
}

/// Upgrade one TCP stream, bounded by the configured handshake timeout
async fn handshake(
    stream: TcpStream,
    config: &WebSocketConfig,
) -> Result<WebSocketStream<TcpStream>> {
    let mut ws_config = TungsteniteConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);

    // Echo our subprotocol back only when the client offered it
    let subprotocol = config.subprotocol.as_str();
    let upgrade = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        |req: &HsRequest, mut response: HsResponse| {
            let offered = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.split(',').any(|p| p.trim() == subprotocol))
                .unwrap_or(false);
            if offered {
                if let Ok(value) = HeaderValue::from_str(subprotocol) {
                    response
                        .headers_mut()
                        .insert("Sec-WebSocket-Protocol", value);
                }
            }
            Ok(response)
        },
        Some(ws_config),
    );

    match tokio::time::timeout(config.handshake_timeout, upgrade).await {
        Ok(upgraded) => upgraded.map_err(|e| TransportError::Handshake(e.to_string())),
        Err(_) => Err(TransportError::HandshakeTimeout(config.handshake_timeout)),
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)> {
        if self.ready.is_none() {
            self.ready = Some(self.start_acceptor()?);
        }
        let ready = self.ready.as_mut().ok_or(TransportError::ConnectionClosed)?;
        ready.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn close(&self) -> Result<()> {
        if let Some(acceptor) = self.acceptor.lock().take() {
            acceptor.abort();
        }
        Ok(())
    }
}

impl Drop for WebSocketServer {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.get_mut().take() {
            acceptor.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_config() {
        let config = WebSocketConfig::default();
        assert_eq!(config.subprotocol, "wamp");
        assert!(config.send_queue_capacity > 0);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_text_frames_for_json() {
        assert!(matches!(to_frame(Bytes::from_static(b"[5,\"t\"]")), WsMessage::Text(_)));
        assert!(matches!(to_frame(Bytes::from_static(&[0xff, 0xfe])), WsMessage::Binary(_)));
    }
}
