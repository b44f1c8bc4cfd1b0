//! Common test helpers and utilities for WAMP router tests
//!
//! This crate provides:
//! - An in-memory [`RecordingSender`] that captures outbound frames
//! - Condition-based waiting (no hardcoded sleeps)
//! - An RAII [`TestRouter`] serving WebSocket on a free port
//! - WebSocket client helpers that speak the WAMP handshake

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use wamp_core::{codec, Message};
use wamp_router::{Connection, Router, RouterConfig};
use wamp_transport::{
    websocket::{WebSocketReceiver, WebSocketSender},
    Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
    WebSocketTransport,
};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

// ============================================================================
// Recording Sender
// ============================================================================

/// In-memory [`TransportSender`] that records every frame it is handed
#[derive(Clone)]
pub struct RecordingSender {
    frames: Arc<Mutex<Vec<Bytes>>>,
    connected: Arc<AtomicBool>,
    capacity: Option<usize>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
            capacity: None,
        }
    }

    /// Sender whose queue fills up after `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Wrap in a [`Connection`] with a fixed session id
    pub fn connection(&self, session_id: &str) -> Arc<Connection> {
        Arc::new(Connection::with_id(session_id, Arc::new(self.clone())))
    }

    /// All recorded frames, decoded
    pub fn messages(&self) -> Vec<Message> {
        self.frames
            .lock()
            .iter()
            .map(|frame| codec::decode(frame).expect("recorded frame does not decode"))
            .collect()
    }

    /// Recorded frames other than WELCOME
    pub fn non_welcome(&self) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| !matches!(m, Message::Welcome(_)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportSender for RecordingSender {
    async fn send(&self, data: Bytes) -> wamp_transport::Result<()> {
        self.try_send(data)
    }

    fn try_send(&self, data: Bytes) -> wamp_transport::Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let mut frames = self.frames.lock();
        if let Some(capacity) = self.capacity {
            if frames.len() >= capacity {
                return Err(TransportError::QueueFull);
            }
        }
        frames.push(data);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> wamp_transport::Result<()> {
        self.disconnect();
        Ok(())
    }
}

// ============================================================================
// Test Router - RAII wrapper with proper cleanup
// ============================================================================

/// A test router that stops on drop
pub struct TestRouter {
    port: u16,
    router: Arc<Router>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestRouter {
    /// Start a test router with default configuration
    pub async fn start() -> Self {
        Self::start_with(Router::new(RouterConfig {
            server_ident: "test-router".to_string(),
            ..Default::default()
        }))
        .await
    }

    /// Start an already configured router
    pub async fn start_with(router: Router) -> Self {
        let port = find_available_port().await;
        let addr = format!("127.0.0.1:{}", port);
        let router = Arc::new(router);

        let serving = Arc::clone(&router);
        let handle = tokio::spawn(async move {
            let _ = serving.serve_websocket(&addr).await;
        });

        let listening = wait_for(
            || {
                let port = port;
                async move {
                    tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port))
                        .await
                        .is_ok()
                }
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await;
        assert!(listening, "test router did not start listening");

        Self {
            port,
            router,
            handle: Some(handle),
        }
    }

    /// WebSocket URL of the router
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn stop(&mut self) {
        self.router.stop();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TestRouter {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// WebSocket Client Helpers
// ============================================================================

/// A connected WAMP test client
pub struct TestClient {
    pub session_id: String,
    pub sender: WebSocketSender,
    pub receiver: WebSocketReceiver,
}

impl TestClient {
    /// Connect and wait for WELCOME
    pub async fn connect(url: &str) -> Self {
        let (sender, mut receiver) = WebSocketTransport::connect(url).await.unwrap();

        let session_id = match next_message(&mut receiver, DEFAULT_TIMEOUT).await {
            Some(Message::Welcome(welcome)) => welcome.session_id,
            other => panic!("expected WELCOME, got {:?}", other),
        };

        Self {
            session_id,
            sender,
            receiver,
        }
    }

    /// Encode and send a message
    pub async fn send(&self, message: &Message) {
        self.sender
            .send(codec::encode(message).unwrap())
            .await
            .unwrap();
    }

    /// Send a raw JSON frame
    pub async fn send_json(&self, value: serde_json::Value) {
        self.sender
            .send(Bytes::from(value.to_string()))
            .await
            .unwrap();
    }

    /// Next message, or None on timeout/close
    pub async fn recv(&mut self, max_wait: Duration) -> Option<Message> {
        next_message(&mut self.receiver, max_wait).await
    }
}

/// Wait for the next decodable message on a receiver
pub async fn next_message(
    receiver: &mut impl TransportReceiver,
    max_wait: Duration,
) -> Option<Message> {
    timeout(max_wait, async {
        loop {
            match receiver.recv().await {
                Some(TransportEvent::Data(data)) => {
                    if let Ok(msg) = codec::decode(&data) {
                        return Some(msg);
                    }
                }
                Some(TransportEvent::Connected) => continue,
                _ => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
