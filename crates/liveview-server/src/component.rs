//! Components: markup producers with event handlers, mounted into a session.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use liveview_core::{ComponentId, HandlerError};
use serde_json::Value;

use crate::session::Session;

/// A server-side view fragment mounted under a [`ComponentId`].
///
/// Rendered markup replaces the inner HTML of the element carrying the
/// component's id. Components that only react to events on an element the
/// root layout already contains return `None` from [`Component::render`].
#[async_trait]
pub trait Component: Send + Sync {
    /// Produce markup from current state.
    fn render(&self, id: &ComponentId) -> Option<String>;

    /// Called once after every component has been committed to the client.
    ///
    /// Runs on a task of its own alongside the connection, so it may query
    /// the client. Stops early if the session is torn down.
    async fn start(&self, _id: &ComponentId, _session: &Arc<Session>) {}

    /// Handle a client event targeting this component.
    async fn handle_event(
        &self,
        id: &ComponentId,
        event: &str,
        payload: Value,
        session: &Arc<Session>,
    ) -> Result<(), HandlerError> {
        let _ = (id, payload, session);
        Err(HandlerError::UnknownEvent(event.to_owned()))
    }
}

type RenderFn = Arc<dyn Fn(&ComponentId) -> Option<String> + Send + Sync>;
type EventFn =
    Arc<dyn Fn(Arc<Session>, Value) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A [`Component`] assembled from closures: one render function plus a
/// table of named event handlers.
#[derive(Clone)]
pub struct EventComponent {
    render: RenderFn,
    events: HashMap<String, EventFn>,
}

impl EventComponent {
    /// Component whose markup is produced by `render`.
    pub fn new<R>(render: R) -> Self
    where
        R: Fn(&ComponentId) -> String + Send + Sync + 'static,
    {
        Self {
            render: Arc::new(move |id: &ComponentId| Some(render(id))),
            events: HashMap::new(),
        }
    }

    /// Component with fixed markup.
    pub fn markup(html: impl Into<String>) -> Self {
        let html = html.into();
        Self::new(move |_| html.clone())
    }

    /// Component without markup of its own, used to attach handlers to an
    /// element the layout already renders.
    pub fn handlers() -> Self {
        Self {
            render: Arc::new(|_: &ComponentId| None),
            events: HashMap::new(),
        }
    }

    /// Register the handler for `event`, replacing any previous one.
    #[must_use]
    pub fn on<F, Fut>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Session>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: EventFn = Arc::new(move |session: Arc<Session>, payload: Value| {
            handler(session, payload).boxed()
        });
        let _ = self.events.insert(event.into(), handler);
        self
    }

    /// Whether a handler exists for `event`.
    pub fn handles(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }
}

impl std::fmt::Debug for EventComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<_> = self.events.keys().collect();
        events.sort();
        f.debug_struct("EventComponent")
            .field("events", &events)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Component for EventComponent {
    fn render(&self, id: &ComponentId) -> Option<String> {
        (self.render)(id)
    }

    async fn handle_event(
        &self,
        _id: &ComponentId,
        event: &str,
        payload: Value,
        session: &Arc<Session>,
    ) -> Result<(), HandlerError> {
        let Some(handler) = self.events.get(event) else {
            return Err(HandlerError::UnknownEvent(event.to_owned()));
        };
        handler(Arc::clone(session), payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_renders_fixed_html() {
        let c = EventComponent::markup("<b>hi</b>");
        assert_eq!(c.render(&"x".into()).as_deref(), Some("<b>hi</b>"));
    }

    #[test]
    fn render_receives_mount_id() {
        let c = EventComponent::new(|id| format!("<span>{id}</span>"));
        assert_eq!(c.render(&"label".into()).as_deref(), Some("<span>label</span>"));
    }

    #[test]
    fn handlers_only_has_no_markup() {
        let c = EventComponent::handlers().on("Click", |_, _| async { Ok(()) });
        assert!(c.render(&"btn".into()).is_none());
        assert!(c.handles("Click"));
        assert!(!c.handles("KeyUp"));
    }

    #[test]
    fn debug_lists_events_sorted() {
        let c = EventComponent::handlers()
            .on("KeyUp", |_, _| async { Ok(()) })
            .on("Click", |_, _| async { Ok(()) });
        let rendered = format!("{c:?}");
        assert!(rendered.contains(r#"["Click", "KeyUp"]"#), "{rendered}");
    }
}
