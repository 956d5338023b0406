//! One live connection's server-side state.
//!
//! A [`Session`] owns the components mounted for a client, the table of
//! queries awaiting the client's answer, and the outbound queue feeding the
//! connection's writer. It moves through `Running -> Closing -> Closed`;
//! only a running session dispatches events, issues queries or runs
//! scheduled callbacks.

mod handlers;
mod hooks;
mod outbound;
mod pending;
mod spec;

pub use handlers::HandlerRegistry;
pub use hooks::{
    DestroyCallback, EventCallback, FIRST_CONTACT_MESSAGE, FirstContact, MIN_TICK_INTERVAL,
    SessionCallback, SessionHooks,
};
pub use outbound::Outbound;
pub use pending::PendingRequests;
pub use spec::{ROOT_COMPONENT_ID, SessionFactory, SessionSpec};

use std::sync::Arc;
use std::time::Duration;

use liveview_core::protocol::{self, ClientFrame, QueryKind, ServerFrame};
use liveview_core::{ComponentId, ProtocolError, QueryError, RequestId, SessionError, SessionId};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::component::Component;
use crate::config::SessionConfig;
use crate::fault::contain;
use crate::metrics::{
    QUERY_FAILURES_TOTAL, QUERY_REQUESTS_TOTAL, SESSION_FRAMES_DROPPED_TOTAL,
    SESSION_FRAMES_TOTAL, SESSIONS_ACTIVE,
};
use crate::registry::SessionRegistry;
use crate::{scheduler, teardown};

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting events, queries and scheduled work.
    Running,
    /// Teardown has started.
    Closing,
    /// Teardown has finished.
    Closed,
}

/// A client event waiting to be handed to its component.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// Target component.
    pub target: ComponentId,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}

/// How an inbound frame was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The target handler ran to completion.
    Dispatched,
    /// No component is mounted under the target id.
    UnknownTarget,
    /// The handler returned an error or panicked.
    HandlerFailed,
    /// A pending query received its value.
    Fulfilled,
    /// A query response matched nothing pending (late or duplicate).
    Unmatched,
    /// The frame was not a well-formed client message.
    Malformed,
    /// The frame had a type this runtime ignores.
    Unsupported,
    /// The session is no longer running.
    NotRunning,
}

/// First step of frame handling: either done already or an event to run.
#[derive(Debug, PartialEq)]
pub enum Routed {
    /// An event for a component handler.
    Invoke(Invocation),
    /// Fully handled without running application code.
    Handled(FrameOutcome),
}

/// Server-side state for one connected client.
pub struct Session {
    id: SessionId,
    state: Mutex<SessionState>,
    handlers: HandlerRegistry,
    pending: PendingRequests,
    outbound: Outbound,
    hooks: SessionHooks,
    config: SessionConfig,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
}

impl Session {
    /// Build, register and start a session.
    ///
    /// The session is fully assembled before it becomes visible in the
    /// registry. On success every mounted component has been committed to the
    /// client, and component `start` calls plus the scheduler run on their
    /// own tasks. Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(session_id))]
    pub fn create(
        spec: SessionSpec,
        registry: Arc<SessionRegistry>,
        outbound: Outbound,
        config: SessionConfig,
    ) -> Result<Arc<Self>, SessionError> {
        let SessionSpec {
            id,
            root,
            components,
            hooks,
        } = spec;
        let id = id.unwrap_or_default();
        let _ = tracing::Span::current().record("session_id", id.as_str());

        let handlers = HandlerRegistry::new();
        let _ = handlers.mount(ROOT_COMPONENT_ID.into(), root);
        for (component_id, component) in components {
            if handlers.mount(component_id.clone(), component).is_some() {
                warn!(component_id = %component_id, "component id mounted twice, keeping the last");
            }
        }

        let session = Arc::new(Self {
            id,
            state: Mutex::new(SessionState::Running),
            handlers,
            pending: PendingRequests::new(),
            outbound,
            hooks,
            config,
            registry: Arc::clone(&registry),
            cancel: CancellationToken::new(),
        });

        registry.register(Arc::clone(&session))?;
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        info!(components = session.handlers.len(), "session created");

        let mounted = session.handlers.snapshot();
        for (component_id, component) in &mounted {
            let _ = session.render_into(component_id, component.as_ref());
        }
        // `start` may query the client, so it cannot hold up the read loop.
        let _ = tokio::spawn(Arc::clone(&session).start_components(mounted));
        let _ = scheduler::spawn(Arc::clone(&session));
        Ok(session)
    }

    async fn start_components(self: Arc<Self>, mounted: Vec<(ComponentId, Arc<dyn Component>)>) {
        for (id, component) in mounted {
            if !self.is_running() {
                return;
            }
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                _ = contain("component_start", async { component.start(&id, &self).await }) => {}
            }
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session still accepts work.
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// The bus this session is registered on.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Mounted components.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Outstanding client queries.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// The queue feeding the connection's writer.
    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Application callbacks.
    pub fn hooks(&self) -> &SessionHooks {
        &self.hooks
    }

    /// Timing configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token cancelled when teardown begins.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Tear the session down. Returns `false` if teardown already ran.
    pub async fn close(self: &Arc<Self>) -> bool {
        teardown::run(self).await
    }

    pub(crate) fn begin_closing(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Running {
            *state = SessionState::Closing;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_closed(&self) {
        *self.state.lock() = SessionState::Closed;
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Decode a frame and handle everything that does not run application
    /// code. Query responses are fulfilled here.
    pub fn route_frame(&self, text: &str) -> Routed {
        let frame = match protocol::decode(text) {
            Ok(frame) => frame,
            Err(error) => {
                let (outcome, reason) = match error {
                    ProtocolError::UnsupportedType(_) => (FrameOutcome::Unsupported, "unsupported"),
                    ProtocolError::Malformed(_) | ProtocolError::MissingType => {
                        (FrameOutcome::Malformed, "malformed")
                    }
                };
                counter!(SESSION_FRAMES_DROPPED_TOTAL, "reason" => reason).increment(1);
                debug!(%error, "dropping client frame");
                return Routed::Handled(outcome);
            }
        };
        counter!(SESSION_FRAMES_TOTAL, "kind" => frame.kind()).increment(1);

        match frame {
            ClientFrame::Invoke { id, event, data } => Routed::Invoke(Invocation {
                target: id,
                event,
                payload: data,
            }),
            ClientFrame::QueryResponse { id_ret, data } => {
                if self.pending.fulfill(&id_ret, data) {
                    Routed::Handled(FrameOutcome::Fulfilled)
                } else {
                    counter!(SESSION_FRAMES_DROPPED_TOTAL, "reason" => "unmatched").increment(1);
                    debug!(request_id = %id_ret, "query response matched nothing pending");
                    Routed::Handled(FrameOutcome::Unmatched)
                }
            }
        }
    }

    /// Run the handler for one event.
    pub async fn dispatch(self: &Arc<Self>, invocation: Invocation) -> FrameOutcome {
        let Invocation {
            target,
            event,
            payload,
        } = invocation;

        if !self.is_running() {
            return FrameOutcome::NotRunning;
        }
        let Some(component) = self.handlers.get(&target) else {
            counter!(SESSION_FRAMES_DROPPED_TOTAL, "reason" => "unknown_target").increment(1);
            warn!(component_id = %target, event, "event for unmounted component");
            return FrameOutcome::UnknownTarget;
        };

        let handled = contain("event_handler", async {
            component.handle_event(&target, &event, payload, self).await
        })
        .await;
        match handled {
            Some(Ok(())) => FrameOutcome::Dispatched,
            Some(Err(error)) => {
                warn!(component_id = %target, event, %error, "event handler failed");
                FrameOutcome::HandlerFailed
            }
            None => FrameOutcome::HandlerFailed,
        }
    }

    /// Handle one frame end to end, running any handler inline.
    pub async fn handle_frame(self: &Arc<Self>, text: &str) -> FrameOutcome {
        match self.route_frame(text) {
            Routed::Invoke(invocation) => self.dispatch(invocation).await,
            Routed::Handled(outcome) => outcome,
        }
    }

    /// Deliver a bus message to the event callback. Returns `false` when the
    /// session is not running or the callback panicked.
    pub(crate) async fn deliver(self: &Arc<Self>, message: Value) -> bool {
        if !self.is_running() {
            return false;
        }
        contain("event_callback", async {
            (self.hooks.on_event)(Arc::clone(self), message).await;
        })
        .await
        .is_some()
    }

    // ── Fragment updates ─────────────────────────────────────────────

    /// Re-render a mounted component into its element.
    pub fn commit(&self, id: &str) -> bool {
        match self.handlers.get(id) {
            Some(component) => self.render_into(&ComponentId::from(id), component.as_ref()),
            None => {
                warn!(component_id = id, "commit for unmounted component");
                false
            }
        }
    }

    fn render_into(&self, id: &ComponentId, component: &dyn Component) -> bool {
        match component.render(id) {
            Some(markup) => self.fill(id.clone(), markup),
            None => false,
        }
    }

    /// Mount a component after creation and commit it.
    pub fn mount(&self, id: impl Into<ComponentId>, component: Arc<dyn Component>) -> bool {
        let id = id.into();
        let _ = self.handlers.mount(id.clone(), component);
        self.commit(&id)
    }

    /// Replace an element's inner HTML.
    pub fn fill(&self, id: impl Into<ComponentId>, html: impl Into<String>) -> bool {
        self.send(&ServerFrame::Fill {
            id: id.into(),
            value: html.into(),
        })
    }

    /// Replace an element's text.
    pub fn set_text(&self, id: impl Into<ComponentId>, text: impl Into<String>) -> bool {
        self.send(&ServerFrame::Text {
            id: id.into(),
            value: text.into(),
        })
    }

    /// Set a DOM property on an element.
    pub fn set_property(
        &self,
        id: impl Into<ComponentId>,
        property: impl Into<String>,
        value: impl Into<Value>,
    ) -> bool {
        self.send(&ServerFrame::Property {
            id: id.into(),
            propertie: property.into(),
            value: value.into(),
        })
    }

    /// Replace an element's inline style.
    pub fn set_style(&self, id: impl Into<ComponentId>, css: impl Into<String>) -> bool {
        self.send(&ServerFrame::Style {
            id: id.into(),
            value: css.into(),
        })
    }

    /// Remove an element from the page.
    pub fn remove(&self, id: impl Into<ComponentId>) -> bool {
        self.send(&ServerFrame::Remove { id: id.into() })
    }

    /// Evaluate a script in the page.
    pub fn eval_script(&self, script: impl Into<String>) -> bool {
        self.send(&ServerFrame::Script {
            value: script.into(),
        })
    }

    fn send(&self, frame: &ServerFrame) -> bool {
        if !self.is_running() {
            return false;
        }
        self.outbound.send_frame(frame)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Ask the client for a value and wait for the answer.
    ///
    /// Resolves with the client's value, or with an error when the session
    /// tears down first, the configured timeout elapses, or the request
    /// cannot be queued. The pending entry is gone when this returns.
    pub async fn query(&self, id: impl Into<ComponentId>, kind: QueryKind) -> Result<Value, QueryError> {
        if !self.is_running() {
            return Err(QueryError::NotRunning);
        }
        let request_id = RequestId::new();
        let rx = self.pending.register(request_id.clone());
        counter!(QUERY_REQUESTS_TOTAL).increment(1);

        let frame = ServerFrame::query(id.into(), request_id.clone(), &kind);
        let result = if self.outbound.send_frame(&frame) {
            self.await_response(rx).await
        } else {
            Err(QueryError::SendFailed)
        };

        if let Err(error) = &result {
            let _ = self.pending.cancel(&request_id);
            let reason = match error {
                QueryError::TornDown => "torn_down",
                QueryError::Timeout { .. } => "timeout",
                QueryError::NotRunning => "not_running",
                QueryError::SendFailed => "send_failed",
            };
            counter!(QUERY_FAILURES_TOTAL, "reason" => reason).increment(1);
            debug!(request_id = %request_id, %error, "query produced no value");
        }
        result
    }

    async fn await_response(
        &self,
        rx: tokio::sync::oneshot::Receiver<Value>,
    ) -> Result<Value, QueryError> {
        let answered = async { rx.await.map_err(|_| QueryError::TornDown) };
        match self.config.query_timeout {
            Some(limit) => tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(QueryError::TornDown),
                answer = tokio::time::timeout(limit, answered) => answer.unwrap_or_else(|_| {
                    Err(QueryError::Timeout { timeout_ms: duration_ms(limit) })
                }),
            },
            None => tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(QueryError::TornDown),
                answer = answered => answer,
            },
        }
    }

    /// `element.value`.
    pub async fn query_value(&self, id: impl Into<ComponentId>) -> Result<Value, QueryError> {
        self.query(id, QueryKind::Value).await
    }

    /// `element.innerHTML`.
    pub async fn query_html(&self, id: impl Into<ComponentId>) -> Result<Value, QueryError> {
        self.query(id, QueryKind::Html).await
    }

    /// `element.innerText`.
    pub async fn query_text(&self, id: impl Into<ComponentId>) -> Result<Value, QueryError> {
        self.query(id, QueryKind::Text).await
    }

    /// `element.style.cssText`.
    pub async fn query_style(&self, id: impl Into<ComponentId>) -> Result<Value, QueryError> {
        self.query(id, QueryKind::Style).await
    }

    /// An arbitrary DOM property.
    pub async fn query_property(
        &self,
        id: impl Into<ComponentId>,
        property: impl Into<String>,
    ) -> Result<Value, QueryError> {
        self.query(id, QueryKind::Property(property.into())).await
    }

    // ── Bus shortcuts ────────────────────────────────────────────────

    /// Broadcast `message` to every registered session.
    pub async fn broadcast(&self, message: impl Into<Value>) -> usize {
        self.registry.broadcast(message.into()).await
    }

    /// Deliver `message` to the listed sessions.
    pub async fn send_to<I>(&self, message: impl Into<Value>, ids: &[I]) -> usize
    where
        I: AsRef<str>,
    {
        self.registry.send_to(message.into(), ids).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("components", &self.handlers.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tokio::sync::mpsc;

    /// A session wired to an in-memory writer channel.
    pub(crate) struct Harness {
        pub session: Arc<Session>,
        pub rx: mpsc::Receiver<Arc<String>>,
    }

    impl Harness {
        /// Next queued frame, parsed.
        pub(crate) async fn next_frame(&mut self) -> Value {
            let text = self.rx.recv().await.expect("writer channel closed");
            serde_json::from_str(&text).expect("frame is JSON")
        }

        /// Discard every queued frame.
        pub(crate) fn drain(&mut self) {
            while self.rx.try_recv().is_ok() {}
        }
    }

    pub(crate) fn harness(
        spec: SessionSpec,
        registry: &Arc<SessionRegistry>,
        config: SessionConfig,
    ) -> Harness {
        let (tx, rx) = mpsc::channel(64);
        let session = Session::create(spec, Arc::clone(registry), Outbound::new(tx), config)
            .expect("session created");
        Harness { session, rx }
    }

    pub(crate) fn root() -> crate::component::EventComponent {
        crate::component::EventComponent::markup("<div id=\"out\"></div>")
    }
}
