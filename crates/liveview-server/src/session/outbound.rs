//! The session's handle on its connection's writer task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use liveview_core::protocol::ServerFrame;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::metrics::OUTBOUND_FRAMES_DROPPED_TOTAL;

/// Bounded, non-blocking queue of serialized frames for one client.
///
/// Sends never wait: a full or closed queue drops the frame and bumps the
/// drop counter. Closing releases the sender so the writer drains and exits.
pub struct Outbound {
    tx: Mutex<Option<mpsc::Sender<Arc<String>>>>,
    dropped: AtomicU64,
}

impl Outbound {
    /// Wrap the sending half of a writer channel.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a serialized frame. Returns `false` if it was dropped.
    pub fn send(&self, message: Arc<String>) -> bool {
        let sent = match self.tx.lock().as_ref() {
            Some(tx) => tx.try_send(message).is_ok(),
            None => false,
        };
        if !sent {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!(OUTBOUND_FRAMES_DROPPED_TOTAL).increment(1);
        }
        sent
    }

    /// Serialize and queue a frame.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match frame.to_json() {
            Ok(json) => self.send(Arc::new(json)),
            Err(error) => {
                warn!(%error, "failed to serialize server frame");
                false
            }
        }
    }

    /// Release the sender. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Frames dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_frame_serializes() {
        let (tx, mut rx) = mpsc::channel(4);
        let outbound = Outbound::new(tx);
        assert!(outbound.send_frame(&ServerFrame::Remove { id: "x".into() }));
        let text = rx.recv().await.unwrap();
        assert_eq!(text.as_str(), r#"{"type":"remove","id":"x"}"#);
        assert_eq!(outbound.drop_count(), 0);
    }

    #[test]
    fn full_queue_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let outbound = Outbound::new(tx);
        assert!(outbound.send(Arc::new("a".into())));
        assert!(!outbound.send(Arc::new("b".into())));
        assert_eq!(outbound.drop_count(), 1);
    }

    #[tokio::test]
    async fn close_ends_writer_stream() {
        let (tx, mut rx) = mpsc::channel(4);
        let outbound = Outbound::new(tx);
        assert!(outbound.send(Arc::new("last".into())));
        assert!(outbound.close());
        assert!(!outbound.close());
        assert!(outbound.is_closed());

        assert_eq!(rx.recv().await.unwrap().as_str(), "last");
        assert!(rx.recv().await.is_none());
        assert!(!outbound.send(Arc::new("late".into())));
        assert_eq!(outbound.drop_count(), 1);
    }
}
