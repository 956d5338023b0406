//! What a factory hands the runtime for each new connection.

use std::sync::Arc;

use liveview_core::{ComponentId, SessionId};

use super::hooks::SessionHooks;
use crate::component::Component;

/// Id the root component is mounted under. The page shell must contain an
/// element with this id.
pub const ROOT_COMPONENT_ID: &str = "content";

/// Everything needed to build one session.
pub struct SessionSpec {
    /// Explicit identifier; a fresh one is generated when `None`.
    pub id: Option<SessionId>,
    /// Root layout, mounted under [`ROOT_COMPONENT_ID`].
    pub root: Arc<dyn Component>,
    /// Auxiliary components, mounted and started in order.
    pub components: Vec<(ComponentId, Arc<dyn Component>)>,
    /// Application callbacks.
    pub hooks: SessionHooks,
}

impl SessionSpec {
    /// Spec with the given root and nothing else.
    pub fn new(root: impl Component + 'static) -> Self {
        Self {
            id: None,
            root: Arc::new(root),
            components: Vec::new(),
            hooks: SessionHooks::default(),
        }
    }

    /// Use a fixed session identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<SessionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Mount an auxiliary component.
    #[must_use]
    pub fn mount(mut self, id: impl Into<ComponentId>, component: impl Component + 'static) -> Self {
        self.components.push((id.into(), Arc::new(component)));
        self
    }

    /// Attach callbacks.
    #[must_use]
    pub fn hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// Builds a [`SessionSpec`] for each accepted connection.
pub trait SessionFactory: Send + Sync {
    /// Produce a fresh spec.
    fn create(&self) -> SessionSpec;
}

impl<F> SessionFactory for F
where
    F: Fn() -> SessionSpec + Send + Sync,
{
    fn create(&self) -> SessionSpec {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::EventComponent;

    #[test]
    fn closure_is_a_factory() {
        let factory = || {
            SessionSpec::new(EventComponent::markup("<p>root</p>"))
                .mount("btn", EventComponent::handlers())
                .with_id("fixed")
        };
        let spec = factory.create();
        assert_eq!(spec.id.as_deref(), Some("fixed"));
        assert_eq!(spec.components.len(), 1);
        assert_eq!(spec.components[0].0.as_str(), "btn");
    }
}
