//! Server shutdown: stop accepting connections, tear down live sessions,
//! then wait for the serving tasks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::SessionRegistry;

/// How long shutdown waits on session teardown and on serving tasks.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// What a shutdown did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Sessions torn down by this call.
    pub sessions_closed: usize,
    /// Whether session teardown or a serving task outlived the drain timeout.
    pub timed_out: bool,
}

/// Owns the stop signal for the listener and the teardown of every session
/// still registered when it fires.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: Arc<SessionRegistry>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator for the sessions in `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
            tasks: Mutex::new(Vec::new()),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Bound each drain phase by `timeout` instead of the default.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Token the listener stops on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for `handle` during shutdown. A task tracked after shutdown
    /// started is aborted.
    pub fn track(&self, handle: JoinHandle<()>) {
        if self.is_shutting_down() {
            handle.abort();
            return;
        }
        self.tasks.lock().push(handle);
    }

    /// Stop the listener, tear down every registered session and wait for
    /// tracked tasks. Later calls only report sessions registered since.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.token.cancel();
        let mut report = ShutdownReport::default();

        // Teardown keeps running on its own task if it outlives the timeout.
        let registry = Arc::clone(&self.registry);
        let closing = tokio::spawn(async move { registry.close_all().await });
        match tokio::time::timeout(self.drain_timeout, closing).await {
            Ok(Ok(closed)) => report.sessions_closed = closed,
            Ok(Err(error)) => warn!(%error, "session teardown task failed"),
            Err(_) => {
                warn!(timeout = ?self.drain_timeout, "session teardown timed out");
                report.timed_out = true;
            }
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        let task_count = tasks.len();
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(self.drain_timeout, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(task_count, "serving tasks outlived the drain timeout");
            aborts.iter().for_each(tokio::task::AbortHandle::abort);
            report.timed_out = true;
        }

        info!(
            sessions_closed = report.sessions_closed,
            task_count,
            timed_out = report.timed_out,
            "shutdown complete"
        );
        report
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutting_down", &self.is_shutting_down())
            .field("tracked_tasks", &self.tasks.lock().len())
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}
