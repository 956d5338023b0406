//! Process-wide session registry and message bus.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use liveview_core::{SessionError, SessionId};
use metrics::counter;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::metrics::BROADCAST_DELIVERIES_TOTAL;
use crate::session::Session;

/// Live sessions indexed by id.
///
/// Fan-out works on a snapshot taken under the read lock, so callbacks run
/// without the lock held and may register, unregister or broadcast again.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Add a session. Fails if its id is already held by a live session.
    pub fn register(&self, session: Arc<Session>) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(session.id()) {
            return Err(SessionError::DuplicateId(session.id().clone()));
        }
        let _ = sessions.insert(session.id().clone(), session);
        Ok(())
    }

    /// Remove a session. Returns `false` if it was not registered.
    pub fn unregister(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Session registered under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Every registered session at this instant.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Deliver `message` to the event callback of every registered session.
    ///
    /// Returns the number of callbacks that completed. A panicking callback
    /// does not stop delivery to the rest.
    pub async fn broadcast(&self, message: Value) -> usize {
        let recipients = self.snapshot();
        debug!(recipients = recipients.len(), "broadcast");
        deliver_all(&recipients, &message).await
    }

    /// Deliver `message` to the listed sessions. Unknown ids are skipped.
    pub async fn send_to<I>(&self, message: Value, ids: &[I]) -> usize
    where
        I: AsRef<str>,
    {
        let recipients: Vec<_> = {
            let sessions = self.sessions.read();
            ids.iter()
                .filter_map(|id| sessions.get(id.as_ref()).cloned())
                .collect()
        };
        debug!(requested = ids.len(), recipients = recipients.len(), "send_to");
        deliver_all(&recipients, &message).await
    }

    /// Tear down every registered session.
    pub async fn close_all(&self) -> usize {
        let sessions = self.snapshot();
        let closed = join_all(sessions.iter().map(|session| session.close()))
            .await
            .into_iter()
            .filter(|closed| *closed)
            .count();
        info!(closed, "closed all sessions");
        closed
    }
}

async fn deliver_all(recipients: &[Arc<Session>], message: &Value) -> usize {
    let delivered = join_all(
        recipients
            .iter()
            .map(|session| session.deliver(message.clone())),
    )
    .await
    .into_iter()
    .filter(|delivered| *delivered)
    .count();
    counter!(BROADCAST_DELIVERIES_TOTAL).increment(delivered as u64);
    delivered
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}
