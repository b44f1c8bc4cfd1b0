//! Pending RPC call tracking
//!
//! Each call id moves `absent -> pending -> absent`. Registering an id that is
//! already pending is rejected; the existing entry is left untouched so the
//! original caller still gets its own answer.
//!
//! Call ids are chosen by clients and come back into use once a call is
//! purged. Every registration is therefore stamped with a tracker-wide
//! token, and executors answer through [`CallTracker::resolve_matching`] so
//! an answer for a purged call can never land on a newer call with the same id.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;
use wamp_core::{CallId, SessionId};

use crate::error::{Result, RouterError};

/// A call awaiting its result or error
#[derive(Debug, Clone)]
pub struct PendingCall {
    /// Session that issued the CALL
    pub session_id: SessionId,
    /// Procedure URI, after prefix expansion
    pub proc_uri: String,
    /// Registration token, unique for the life of the tracker
    pub token: u64,
    pub created_at: Instant,
}

impl PendingCall {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Maps in-flight call ids to the session awaiting the answer
pub struct CallTracker {
    pending: DashMap<CallId, PendingCall>,
    next_token: AtomicU64,
}

impl CallTracker {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_token: AtomicU64::new(1),
        }
    }

    /// Record a new pending call. Returns the registration token.
    pub fn register(&self, call_id: &str, session: &SessionId, proc_uri: &str) -> Result<u64> {
        match self.pending.entry(call_id.to_string()) {
            Entry::Occupied(_) => Err(RouterError::DuplicateCallId(call_id.to_string())),
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                slot.insert(PendingCall {
                    session_id: session.clone(),
                    proc_uri: proc_uri.to_string(),
                    token,
                    created_at: Instant::now(),
                });
                Ok(token)
            }
        }
    }

    /// Take the pending entry for a result or error.
    ///
    /// Fails with `UnknownCallId` if the call was never registered, was
    /// already answered, or its session has disconnected.
    pub fn resolve(&self, call_id: &str) -> Result<PendingCall> {
        self.pending
            .remove(call_id)
            .map(|(_, call)| call)
            .ok_or_else(|| RouterError::UnknownCallId(call_id.to_string()))
    }

    /// Take the pending entry only if it is the registration `token` names.
    ///
    /// A call id that was purged and registered again by another caller
    /// fails with `UnknownCallId` and the newer call stays pending.
    pub fn resolve_matching(&self, call_id: &str, token: u64) -> Result<PendingCall> {
        self.pending
            .remove_if(call_id, |_, call| call.token == token)
            .map(|(_, call)| call)
            .ok_or_else(|| RouterError::UnknownCallId(call_id.to_string()))
    }

    /// Drop every call issued by a session. Returns the purged call ids.
    pub fn purge_connection(&self, session: &SessionId) -> Vec<CallId> {
        let mut purged = Vec::new();
        self.pending.retain(|call_id, call| {
            if call.session_id == *session {
                purged.push(call_id.clone());
                false
            } else {
                true
            }
        });
        if !purged.is_empty() {
            debug!("Purged {} pending calls for session {}", purged.len(), session);
        }
        purged
    }

    /// Remove and return calls pending longer than `max_age`
    pub fn expire_older_than(&self, max_age: Duration) -> Vec<(CallId, PendingCall)> {
        let stale: Vec<CallId> = self
            .pending
            .iter()
            .filter(|entry| entry.value().age() >= max_age)
            .map(|entry| entry.key().clone())
            .collect();

        // Re-check on removal: the call may have been answered meanwhile
        stale
            .into_iter()
            .filter_map(|call_id| {
                self.pending
                    .remove_if(&call_id, |_, call| call.age() >= max_age)
            })
            .collect()
    }

    pub fn is_pending(&self, call_id: &str) -> bool {
        self.pending.contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for CallTracker {
    fn default() -> Self {
        Self::new()
    }
}
