//! Application handler traits
//!
//! Pub/sub observers and RPC executors are separate capabilities; an
//! application installs only the ones it needs on the [`Dispatcher`].

use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::warn;
use wamp_core::{error_uri, CallId, SessionId};

use crate::dispatch::Dispatcher;

/// Observer for subscription and publish activity.
///
/// Hooks run after the registry has been updated. All default to no-ops.
pub trait PubSubHandler: Send + Sync {
    fn on_subscribe(&self, _session: &SessionId, _topic: &str) {}

    fn on_unsubscribe(&self, _session: &SessionId, _topic: &str) {}

    /// `recipients` is the number of sessions the event was queued for
    fn on_publish(&self, _session: &SessionId, _topic: &str, _event: &Value, _recipients: usize) {}

    fn on_close(&self, _session: &SessionId) {}
}

/// Executes RPC calls.
///
/// The call is already registered as pending when `on_call` runs. The
/// handler answers through the responder, now or later from another task.
pub trait RpcHandler: Send + Sync {
    fn on_call(&self, request: CallRequest, responder: CallResponder);
}

/// A CALL handed to an [`RpcHandler`]
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub session_id: SessionId,
    pub call_id: CallId,
    /// Procedure URI after prefix expansion
    pub proc_uri: String,
    pub args: Vec<Value>,
}

/// One-shot handle for answering a call.
///
/// Consuming `result` or `error` answers the call. A responder dropped
/// without answering sends an internal-error CALLERROR instead, so the
/// caller is never left waiting on a forgotten call.
///
/// A responder is bound to one registration of its call id. Once that call
/// is purged (caller disconnected or timed out) every answer is discarded,
/// even if a new call has since reused the id.
pub struct CallResponder {
    call_id: CallId,
    token: u64,
    dispatcher: Option<Weak<Dispatcher>>,
}

impl CallResponder {
    pub(crate) fn new(call_id: CallId, token: u64, dispatcher: Weak<Dispatcher>) -> Self {
        Self {
            call_id,
            token,
            dispatcher: Some(dispatcher),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Send a CALLRESULT. Returns the session it was delivered to.
    pub fn result(mut self, value: Value) -> Option<SessionId> {
        let dispatcher = self.dispatcher.take()?.upgrade()?;
        dispatcher.answer_result(&self.call_id, Some(self.token), value)
    }

    /// Send a CALLERROR. Returns the session it was delivered to.
    pub fn error(
        mut self,
        error_uri: &str,
        description: &str,
        details: Option<Value>,
    ) -> Option<SessionId> {
        let dispatcher = self.dispatcher.take()?.upgrade()?;
        dispatcher.answer_error(&self.call_id, Some(self.token), error_uri, description, details)
    }

    /// Answer with a [`CallFailure`]
    pub fn fail(self, failure: CallFailure) -> Option<SessionId> {
        self.error(&failure.error_uri, &failure.description, failure.details)
    }
}

impl Drop for CallResponder {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take().and_then(|d| d.upgrade()) {
            warn!("Call {} dropped without an answer", self.call_id);
            dispatcher.answer_error(
                &self.call_id,
                Some(self.token),
                error_uri::INTERNAL_ERROR,
                "procedure did not answer",
                None,
            );
        }
    }
}

impl std::fmt::Debug for CallResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallResponder")
            .field("call_id", &self.call_id)
            .field("answered", &self.dispatcher.is_none())
            .finish()
    }
}

/// Error returned by a registered procedure
#[derive(Debug, Clone, PartialEq)]
pub struct CallFailure {
    pub error_uri: String,
    pub description: String,
    pub details: Option<Value>,
}

impl CallFailure {
    pub fn new(error_uri: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error_uri: error_uri.into(),
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Synchronous procedure body
pub type Procedure = Arc<dyn Fn(&CallRequest) -> Result<Value, CallFailure> + Send + Sync>;

/// [`RpcHandler`] dispatching on procedure URI
pub struct ProcedureRegistry {
    procedures: DashMap<String, Procedure>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self {
            procedures: DashMap::new(),
        }
    }

    /// Register or replace the procedure for a URI
    pub fn register<F>(&self, proc_uri: impl Into<String>, procedure: F)
    where
        F: Fn(&CallRequest) -> Result<Value, CallFailure> + Send + Sync + 'static,
    {
        self.procedures.insert(proc_uri.into(), Arc::new(procedure));
    }

    pub fn unregister(&self, proc_uri: &str) -> bool {
        self.procedures.remove(proc_uri).is_some()
    }

    pub fn contains(&self, proc_uri: &str) -> bool {
        self.procedures.contains_key(proc_uri)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

impl Default for ProcedureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcHandler for ProcedureRegistry {
    fn on_call(&self, request: CallRequest, responder: CallResponder) {
        // Clone out so the map guard is not held while the procedure runs
        let procedure = self
            .procedures
            .get(&request.proc_uri)
            .map(|entry| Arc::clone(entry.value()));

        match procedure {
            Some(procedure) => match procedure(&request) {
                Ok(value) => {
                    responder.result(value);
                }
                Err(failure) => {
                    responder.fail(failure);
                }
            },
            None => {
                responder.error(
                    error_uri::NO_SUCH_PROCEDURE,
                    &format!("no procedure registered for {}", request.proc_uri),
                    None,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_contents() {
        let registry = ProcedureRegistry::new();
        registry.register("http://example.com/echo", |req: &CallRequest| {
            Ok(Value::Array(req.args.clone()))
        });
        assert!(registry.contains("http://example.com/echo"));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("http://example.com/echo"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_call_failure_builder() {
        let failure = CallFailure::new("http://example.com/e", "bad input")
            .with_details(json!({"arg": 0}));
        assert_eq!(failure.details, Some(json!({"arg": 0})));
    }

    #[test]
    fn test_responder_without_dispatcher_is_inert() {
        let responder = CallResponder::new("1".into(), 1, Weak::new());
        assert_eq!(responder.call_id(), "1");
        assert!(responder.result(json!(null)).is_none());
    }
}
