//! Main router implementation
//!
//! The router is transport-agnostic: it accepts connections from any
//! transport that implements [`TransportServer`] and feeds decoded messages
//! into a shared [`Dispatcher`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use wamp_router::{ProcedureRegistry, Router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let procedures = Arc::new(ProcedureRegistry::new());
//!     procedures.register("http://example.com/ping", |_| Ok(json!("pong")));
//!
//!     let router = Router::new(RouterConfig::default()).with_rpc_handler(procedures);
//!     router.serve_websocket("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use wamp_core::{codec, SERVER_IDENT};
use wamp_transport::{
    TransportError, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

#[cfg(feature = "websocket")]
use wamp_transport::{WebSocketConfig, WebSocketServer};

use crate::{
    connection::Connection,
    dispatch::Dispatcher,
    error::{Result, RouterError},
    handler::{PubSubHandler, RpcHandler},
};

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Server identification sent in WELCOME
    pub server_ident: String,
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Fail calls that stay pending this long (None = never)
    pub call_timeout: Option<Duration>,
    /// How often stale calls are checked for
    pub call_reap_interval: Duration,
    /// Outbound messages queued per connection before sends are dropped
    pub send_queue_capacity: usize,
    /// Largest inbound frame accepted
    pub max_message_size: usize,
    /// Time a new client has to finish the WebSocket upgrade
    pub handshake_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            server_ident: SERVER_IDENT.to_string(),
            max_sessions: 1000,
            call_timeout: Some(Duration::from_secs(60)),
            call_reap_interval: Duration::from_secs(1),
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(RouterError::Config("max_sessions must be at least 1".into()));
        }
        if self.send_queue_capacity == 0 {
            return Err(RouterError::Config(
                "send_queue_capacity must be at least 1".into(),
            ));
        }
        if self.call_reap_interval.is_zero() {
            return Err(RouterError::Config(
                "call_reap_interval must be non-zero".into(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(RouterError::Config(
                "handshake_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// WAMP router
pub struct Router {
    config: RouterConfig,
    dispatcher: Arc<Dispatcher>,
    /// Running flag
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        let dispatcher = Dispatcher::new(config.server_ident.clone());
        Self {
            config,
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Install the RPC executor
    pub fn with_rpc_handler(self, handler: Arc<dyn RpcHandler>) -> Self {
        self.dispatcher.set_rpc_handler(handler);
        self
    }

    /// Install the pub/sub observer
    pub fn with_pubsub_handler(self, handler: Arc<dyn PubSubHandler>) -> Self {
        self.dispatcher.set_pubsub_handler(handler);
        self
    }

    // =========================================================================
    // Transport-Agnostic Methods
    // =========================================================================

    /// Serve using any TransportServer implementation.
    ///
    /// Runs until [`Router::stop`] is called.
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        self.config.validate()?;
        info!("Router accepting connections");
        self.running.store(true, Ordering::SeqCst);

        if let Some(timeout) = self.config.call_timeout {
            self.spawn_call_reaper(timeout);
        }

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                accepted = server.accept() => match accepted {
                    Ok((sender, receiver, addr)) => {
                        self.handle_connection(Arc::new(sender), receiver, addr).await;
                    }
                    Err(TransportError::ConnectionClosed) => {
                        warn!("Listener closed");
                        break;
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
                _ = self.shutdown.notified() => break,
            }
        }

        info!("Router stopped accepting connections");
        server.close().await?;
        Ok(())
    }

    // =========================================================================
    // WebSocket Transport
    // =========================================================================

    /// Start the router on WebSocket.
    #[cfg(feature = "websocket")]
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        let server = WebSocketServer::bind(addr)
            .await?
            .with_config(WebSocketConfig {
                send_queue_capacity: self.config.send_queue_capacity,
                max_message_size: self.config.max_message_size,
                handshake_timeout: self.config.handshake_timeout,
                ..Default::default()
            });
        info!("WebSocket server listening on {}", addr);
        self.serve_on(server).await
    }

    fn spawn_call_reaper(&self, timeout: Duration) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        let interval = self.config.call_reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                let expired = dispatcher.expire_stale_calls(timeout);
                if expired > 0 {
                    debug!("Expired {} stale calls", expired);
                }
            }
        });
    }

    /// Handle a new connection
    async fn handle_connection(
        &self,
        sender: Arc<dyn TransportSender>,
        mut receiver: impl TransportReceiver + 'static,
        addr: SocketAddr,
    ) {
        if self.dispatcher.connection_count() >= self.config.max_sessions {
            warn!(
                "Rejecting {}: session limit {} reached",
                addr, self.config.max_sessions
            );
            let _ = sender.close().await;
            return;
        }

        let conn = Arc::new(Connection::new(sender).with_remote_addr(addr));
        let session = conn.id.clone();
        if let Err(e) = self.dispatcher.open(conn) {
            error!("Failed to welcome {}: {}", addr, e);
            self.dispatcher.close(&session);
            return;
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match receiver.recv().await {
                    Some(TransportEvent::Data(data)) => match codec::decode(&data) {
                        Ok(msg) => {
                            if let Err(e) = dispatcher.dispatch(&session, msg) {
                                if e.is_recoverable() {
                                    warn!("Session {}: {}", session, e);
                                } else {
                                    error!("Session {}: {}", session, e);
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Decode error from {}: {}", addr, e);
                        }
                    },
                    Some(TransportEvent::Disconnected { reason }) => {
                        info!("Client {} disconnected: {:?}", addr, reason);
                        break;
                    }
                    Some(TransportEvent::Error(e)) => {
                        error!("Transport error from {}: {}", addr, e);
                        break;
                    }
                    Some(TransportEvent::Connected) => {}
                    None => break,
                }
            }

            dispatcher.close(&session);
        });
    }

    /// Stop the router
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Shared dispatcher, for in-process publishing and inspection
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Get session count
    pub fn session_count(&self) -> usize {
        self.dispatcher.connection_count()
    }

    /// Topics with at least one subscriber
    pub fn topic_count(&self) -> usize {
        self.dispatcher.topics().topic_count()
    }

    /// Calls awaiting a result or error
    pub fn pending_call_count(&self) -> usize {
        self.dispatcher.calls().len()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}
