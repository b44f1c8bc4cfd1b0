//! Dispatch core
//!
//! Routes decoded inbound messages to the topic registry and call tracker and
//! queues the resulting outbound messages. The dispatcher owns both registries
//! and the table of open connections; it keeps no per-message state of its own.
//!
//! Outbound sends never wait on a socket: each connection has a bounded
//! queue and a full queue drops the message for that connection only.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use wamp_core::{
    codec, error_uri, CallErrorMessage, CallResultMessage, EventMessage, Message, SessionId,
};

use crate::{
    calls::{CallTracker, PendingCall},
    connection::Connection,
    error::{Result, RouterError},
    handler::{CallRequest, CallResponder, PubSubHandler, RpcHandler},
    topic::{PublishFilter, TopicRegistry},
};

/// Message router for one server instance
pub struct Dispatcher {
    server_ident: String,
    /// Open connections
    connections: DashMap<SessionId, Arc<Connection>>,
    topics: TopicRegistry,
    calls: CallTracker,
    rpc: RwLock<Option<Arc<dyn RpcHandler>>>,
    pubsub: RwLock<Option<Arc<dyn PubSubHandler>>>,
}

impl Dispatcher {
    pub fn new(server_ident: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            server_ident: server_ident.into(),
            connections: DashMap::new(),
            topics: TopicRegistry::new(),
            calls: CallTracker::new(),
            rpc: RwLock::new(None),
            pubsub: RwLock::new(None),
        })
    }

    /// Install the RPC executor
    pub fn set_rpc_handler(&self, handler: Arc<dyn RpcHandler>) {
        *self.rpc.write() = Some(handler);
    }

    /// Install the pub/sub observer
    pub fn set_pubsub_handler(&self, handler: Arc<dyn PubSubHandler>) {
        *self.pubsub.write() = Some(handler);
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Register a new connection and send its WELCOME
    pub fn open(&self, conn: Arc<Connection>) -> Result<()> {
        let welcome = conn.welcome_message(&self.server_ident);
        self.connections.insert(conn.id.clone(), Arc::clone(&conn));
        info!("Session opened: {}", conn.id);
        conn.send_message(&welcome)
    }

    /// Forget a connection.
    ///
    /// The connection leaves the open table before its subscriptions and
    /// pending calls are purged, so nothing resolved afterwards can reach it.
    /// The purge runs on every call, so closing again sweeps up anything a
    /// racing subscribe or call left behind. Returns whether the session was
    /// open.
    pub fn close(&self, session: &SessionId) -> bool {
        let was_open = self.connections.remove(session).is_some();

        let topics = self.topics.remove_connection(session);
        let calls = self.calls.purge_connection(session);
        if !was_open {
            if topics > 0 || !calls.is_empty() {
                debug!(
                    "Swept closed session {} ({} subscriptions, {} pending calls)",
                    session,
                    topics,
                    calls.len()
                );
            }
            return false;
        }

        info!(
            "Session closed: {} ({} subscriptions, {} pending calls dropped)",
            session,
            topics,
            calls.len()
        );

        if let Some(handler) = self.pubsub_handler() {
            handler.on_close(session);
        }
        true
    }

    fn is_open(&self, session: &str) -> bool {
        self.connections.contains_key(session)
    }

    pub fn connection(&self, session: &str) -> Option<Arc<Connection>> {
        self.connections
            .get(session)
            .map(|entry| Arc::clone(entry.value()))
    }

    // =========================================================================
    // Inbound entry point
    // =========================================================================

    /// Route one decoded message from `session`.
    ///
    /// Topic and procedure URIs are CURIE-expanded with the session's
    /// prefixes before they reach the registries.
    pub fn dispatch(self: &Arc<Self>, session: &SessionId, message: Message) -> Result<()> {
        let conn = self
            .connection(session)
            .ok_or_else(|| RouterError::SessionNotFound(session.clone()))?;

        match message {
            Message::Prefix(prefix) => {
                debug!("Session {} prefix {} -> {}", session, prefix.prefix, prefix.uri);
                conn.add_prefix(&prefix.prefix, &prefix.uri);
                Ok(())
            }

            Message::Call(call) => {
                let proc_uri = conn.resolve_uri(&call.proc_uri);
                self.on_call(session, &call.call_id, &proc_uri, call.args)
            }

            Message::CallResult(result) => {
                if self.on_call_result(&result.call_id, result.result).is_none() {
                    debug!("Session {} answered unknown call {}", session, result.call_id);
                }
                Ok(())
            }

            Message::CallError(error) => {
                let delivered = self.on_call_error(
                    &error.call_id,
                    &error.error_uri,
                    &error.error_desc,
                    Some(error.error_details),
                );
                if delivered.is_none() {
                    debug!("Session {} failed unknown call {}", session, error.call_id);
                }
                Ok(())
            }

            Message::Subscribe(sub) => self.on_subscribe(session, &conn.resolve_uri(&sub.topic)),

            Message::Unsubscribe(unsub) => {
                self.on_unsubscribe(session, &conn.resolve_uri(&unsub.topic));
                Ok(())
            }

            Message::Publish(publish) => {
                let topic = conn.resolve_uri(&publish.topic);
                let mut exclude = publish.exclude;
                if publish.exclude_me {
                    exclude.push(session.clone());
                }
                self.on_publish(session, &topic, publish.event, exclude, publish.eligible);
                Ok(())
            }

            Message::Welcome(_) | Message::Event(_) => Err(RouterError::InvalidMessage(format!(
                "{} is server-to-client only",
                message.message_type().name()
            ))),
        }
    }

    // =========================================================================
    // RPC
    // =========================================================================

    /// Register a call and hand it to the RPC executor.
    ///
    /// A reused call id fails with `DuplicateCallId` and leaves the pending
    /// call alone; nothing is sent on the wire. A session that closes while
    /// the call is being registered gets `SessionNotFound` and no entry is
    /// left behind.
    pub fn on_call(
        self: &Arc<Self>,
        session: &SessionId,
        call_id: &str,
        proc_uri: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        if !self.is_open(session) {
            return Err(RouterError::SessionNotFound(session.clone()));
        }
        let token = self.calls.register(call_id, session, proc_uri)?;

        // close() removes the connection before purging; re-check so a
        // registration that raced past that purge is undone here
        if !self.is_open(session) {
            let _ = self.calls.resolve_matching(call_id, token);
            return Err(RouterError::SessionNotFound(session.clone()));
        }
        debug!("Session {} called {} ({})", session, proc_uri, call_id);

        let responder = CallResponder::new(call_id.to_string(), token, Arc::downgrade(self));
        match self.rpc_handler() {
            Some(handler) => handler.on_call(
                CallRequest {
                    session_id: session.clone(),
                    call_id: call_id.to_string(),
                    proc_uri: proc_uri.to_string(),
                    args,
                },
                responder,
            ),
            None => {
                responder.error(
                    error_uri::NO_SUCH_PROCEDURE,
                    &format!("no procedure registered for {}", proc_uri),
                    None,
                );
            }
        }
        Ok(())
    }

    /// Deliver a CALLRESULT to the session awaiting `call_id`.
    ///
    /// Returns the session it was queued for, or `None` when the call id is
    /// unknown or the caller has gone away.
    pub fn on_call_result(&self, call_id: &str, result: Value) -> Option<SessionId> {
        self.answer_result(call_id, None, result)
    }

    /// Deliver a CALLERROR to the session awaiting `call_id`.
    ///
    /// Missing or null `details` go out as `{}`. An empty error URI is
    /// replaced with the internal-error URI.
    pub fn on_call_error(
        &self,
        call_id: &str,
        uri: &str,
        description: &str,
        details: Option<Value>,
    ) -> Option<SessionId> {
        self.answer_error(call_id, None, uri, description, details)
    }

    /// Answer a call, restricted to one registration when `token` is set
    pub(crate) fn answer_result(
        &self,
        call_id: &str,
        token: Option<u64>,
        result: Value,
    ) -> Option<SessionId> {
        let call = self.resolve_call(call_id, token)?;
        let message = Message::CallResult(CallResultMessage {
            call_id: call_id.to_string(),
            result,
        });
        self.deliver(&call.session_id, &message)
            .then_some(call.session_id)
    }

    pub(crate) fn answer_error(
        &self,
        call_id: &str,
        token: Option<u64>,
        uri: &str,
        description: &str,
        details: Option<Value>,
    ) -> Option<SessionId> {
        let call = self.resolve_call(call_id, token)?;
        let uri = if uri.is_empty() {
            warn!("Call {} failed without an error URI", call_id);
            error_uri::INTERNAL_ERROR
        } else {
            uri
        };
        let message = Message::CallError(CallErrorMessage::new(
            call_id,
            uri,
            description,
            details,
        ));
        self.deliver(&call.session_id, &message)
            .then_some(call.session_id)
    }

    fn resolve_call(&self, call_id: &str, token: Option<u64>) -> Option<PendingCall> {
        let resolved = match token {
            Some(token) => self.calls.resolve_matching(call_id, token),
            None => self.calls.resolve(call_id),
        };
        match resolved {
            Ok(call) => Some(call),
            Err(e) => {
                debug!("Dropping answer: {}", e);
                None
            }
        }
    }

    /// Fail every call pending longer than `max_age`.
    /// Returns the number of calls expired.
    pub fn expire_stale_calls(&self, max_age: Duration) -> usize {
        let expired = self.calls.expire_older_than(max_age);
        for (call_id, call) in &expired {
            warn!(
                "Call {} to {} timed out after {:?}",
                call_id,
                call.proc_uri,
                call.age()
            );
            let message = Message::CallError(CallErrorMessage::new(
                call_id.as_str(),
                error_uri::CALL_TIMEOUT,
                "call timed out",
                None,
            ));
            self.deliver(&call.session_id, &message);
        }
        expired.len()
    }

    // =========================================================================
    // Pub/Sub
    // =========================================================================

    /// Subscribe an open session to `topic`.
    ///
    /// Fails with `SessionNotFound` for a session that is not open, or that
    /// closed while the subscription was being added.
    pub fn on_subscribe(&self, session: &SessionId, topic: &str) -> Result<()> {
        if !self.is_open(session) {
            return Err(RouterError::SessionNotFound(session.clone()));
        }
        self.topics.subscribe(topic, session);

        // Undo if close() ran between the two checks
        if !self.is_open(session) {
            self.topics.unsubscribe(topic, session);
            return Err(RouterError::SessionNotFound(session.clone()));
        }

        if let Some(handler) = self.pubsub_handler() {
            handler.on_subscribe(session, topic);
        }
        Ok(())
    }

    pub fn on_unsubscribe(&self, session: &SessionId, topic: &str) {
        self.topics.unsubscribe(topic, session);
        if let Some(handler) = self.pubsub_handler() {
            handler.on_unsubscribe(session, topic);
        }
    }

    /// Fan an EVENT out to the topic's subscribers.
    ///
    /// The publisher is not excluded implicitly; callers list it in
    /// `exclude` to suppress the echo. Returns the number of sessions the
    /// event was queued for.
    pub fn on_publish(
        &self,
        session: &SessionId,
        topic: &str,
        event: Value,
        exclude: Vec<SessionId>,
        eligible: Vec<SessionId>,
    ) -> usize {
        let filter = PublishFilter::new(exclude, eligible);
        let recipients = self.topics.publish(topic, &filter);
        let message = Message::Event(EventMessage {
            topic: topic.to_string(),
            event,
        });

        let mut delivered = 0;
        if !recipients.is_empty() {
            match codec::encode(&message) {
                Ok(data) => {
                    for recipient in &recipients {
                        if self.deliver_bytes(recipient, data.clone()) {
                            delivered += 1;
                        }
                    }
                }
                Err(e) => warn!("Failed to encode event for {}: {}", topic, e),
            }
            debug!(
                "Session {} published to {}: {}/{} recipients",
                session,
                topic,
                delivered,
                recipients.len()
            );
        }

        if let (Some(handler), Message::Event(event)) = (self.pubsub_handler(), &message) {
            handler.on_publish(session, topic, &event.event, delivered);
        }
        delivered
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    fn deliver(&self, session: &SessionId, message: &Message) -> bool {
        match codec::encode(message) {
            Ok(data) => self.deliver_bytes(session, data),
            Err(e) => {
                warn!("Failed to encode {}: {}", message.message_type().name(), e);
                false
            }
        }
    }

    fn deliver_bytes(&self, session: &SessionId, data: bytes::Bytes) -> bool {
        // Clone the handle out so no map guard is held across the send
        let Some(conn) = self.connection(session) else {
            debug!("Session {} is gone, dropping message", session);
            return false;
        };
        match conn.send_bytes(data) {
            Ok(()) => true,
            Err(e) => {
                warn!("Send to {} failed: {}", session, e);
                false
            }
        }
    }

    fn rpc_handler(&self) -> Option<Arc<dyn RpcHandler>> {
        self.rpc.read().clone()
    }

    fn pubsub_handler(&self) -> Option<Arc<dyn PubSubHandler>> {
        self.pubsub.read().clone()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn server_ident(&self) -> &str {
        &self.server_ident
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    pub fn calls(&self) -> &CallTracker {
        &self.calls
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("server_ident", &self.server_ident)
            .field("connections", &self.connections.len())
            .field("topics", &self.topics.topic_count())
            .field("pending_calls", &self.calls.len())
            .finish()
    }
}
