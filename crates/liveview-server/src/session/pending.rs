//! Pending client queries, keyed by request id.

use std::collections::HashMap;

use liveview_core::RequestId;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

/// Table of in-flight queries awaiting a client response.
///
/// Every entry is removed exactly once: by [`fulfill`](Self::fulfill), by
/// [`cancel`](Self::cancel) when the waiter gives up, or by
/// [`cancel_all`](Self::cancel_all) at teardown.
pub struct PendingRequests {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Value>>>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a request, returning the receiver that yields its value.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.lock().insert(id, tx);
        rx
    }

    /// Deliver the client's value.
    ///
    /// Returns `false` for unknown or already-settled ids.
    pub fn fulfill(&self, id: &str, value: Value) -> bool {
        let sender = self.pending.lock().remove(id);
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Drop one entry; its waiter observes a closed channel.
    pub fn cancel(&self, id: &str) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Drop every entry. Returns how many were outstanding.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        drained.len()
    }

    /// Whether `id` is still awaiting a response.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Number of outstanding queries.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no query is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
