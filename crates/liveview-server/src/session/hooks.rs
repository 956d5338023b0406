//! Application callbacks attached to a session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use liveview_core::SessionId;
use serde_json::Value;

use super::Session;
use crate::registry::SessionRegistry;

/// Receives messages from the session bus.
pub type EventCallback = Arc<dyn Fn(Arc<Session>, Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Scheduled work on a live session.
pub type SessionCallback = Arc<dyn Fn(Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs once during teardown, after the session has left the registry.
pub type DestroyCallback =
    Arc<dyn Fn(SessionId, Arc<SessionRegistry>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Message delivered by the default first-contact behaviors.
pub const FIRST_CONTACT_MESSAGE: &str = "FIRST_TIME";

/// Shortest accepted tick interval. Shorter requests are raised to it.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// What happens once the settle delay after creation has elapsed.
#[derive(Clone)]
pub enum FirstContact {
    /// Broadcast [`FIRST_CONTACT_MESSAGE`] to every registered session.
    BroadcastAll,
    /// Deliver [`FIRST_CONTACT_MESSAGE`] to this session only.
    NotifySelf,
    /// Run an application callback.
    Custom(SessionCallback),
}

impl std::fmt::Debug for FirstContact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BroadcastAll => f.write_str("BroadcastAll"),
            Self::NotifySelf => f.write_str("NotifySelf"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Callbacks a [`SessionFactory`](super::SessionFactory) attaches to each
/// new session. Unset callbacks are no-ops.
#[derive(Clone)]
pub struct SessionHooks {
    pub(crate) on_event: EventCallback,
    pub(crate) on_tick: SessionCallback,
    pub(crate) tick_interval: Option<Duration>,
    pub(crate) first_contact: FirstContact,
    pub(crate) on_destroy: DestroyCallback,
}

impl SessionHooks {
    /// Hooks with every callback unset.
    pub fn new() -> Self {
        Self {
            on_event: Arc::new(|_: Arc<Session>, _: Value| async {}.boxed()),
            on_tick: Arc::new(|_: Arc<Session>| async {}.boxed()),
            tick_interval: None,
            first_contact: FirstContact::BroadcastAll,
            on_destroy: Arc::new(|_: SessionId, _: Arc<SessionRegistry>| async {}.boxed()),
        }
    }

    /// Handle messages from [`SessionRegistry::broadcast`] and
    /// [`SessionRegistry::send_to`].
    #[must_use]
    pub fn on_event<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Session>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_event = Arc::new(move |session: Arc<Session>, message: Value| {
            callback(session, message).boxed()
        });
        self
    }

    /// Run `callback` every `interval` while the session is live.
    ///
    /// An interval below [`MIN_TICK_INTERVAL`] is raised to it. An interval
    /// too large for the clock never fires.
    #[must_use]
    pub fn on_tick<F, Fut>(mut self, interval: Duration, callback: F) -> Self
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_tick = Arc::new(move |session: Arc<Session>| callback(session).boxed());
        self.tick_interval = Some(interval.max(MIN_TICK_INTERVAL));
        self
    }

    /// Replace the first-contact callback.
    #[must_use]
    pub fn on_first_contact<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.first_contact(FirstContact::Custom(Arc::new(
            move |session: Arc<Session>| callback(session).boxed(),
        )))
    }

    /// Choose a first-contact behavior.
    #[must_use]
    pub fn first_contact(mut self, first_contact: FirstContact) -> Self {
        self.first_contact = first_contact;
        self
    }

    /// Clean up application state when the session is torn down.
    #[must_use]
    pub fn on_destroy<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(SessionId, Arc<SessionRegistry>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_destroy = Arc::new(move |id: SessionId, registry: Arc<SessionRegistry>| {
            callback(id, registry).boxed()
        });
        self
    }

    /// Configured tick interval, if the application set one.
    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval
    }
}

impl Default for SessionHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHooks")
            .field("tick_interval", &self.tick_interval)
            .field("first_contact", &self.first_contact)
            .finish_non_exhaustive()
    }
}
