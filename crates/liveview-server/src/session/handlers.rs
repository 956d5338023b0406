//! Mounted components, keyed by component id.

use std::collections::HashMap;
use std::sync::Arc;

use liveview_core::ComponentId;
use parking_lot::RwLock;

use crate::component::Component;

#[derive(Default)]
struct Mounted {
    by_id: HashMap<ComponentId, Arc<dyn Component>>,
    order: Vec<ComponentId>,
}

/// The session's component table.
///
/// Lookups return a cloned `Arc` so handlers never run under the lock.
#[derive(Default)]
pub struct HandlerRegistry {
    inner: RwLock<Mounted>,
}

impl HandlerRegistry {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `component` under `id`, returning the component it replaced.
    pub fn mount(
        &self,
        id: ComponentId,
        component: Arc<dyn Component>,
    ) -> Option<Arc<dyn Component>> {
        let mut inner = self.inner.write();
        let replaced = inner.by_id.insert(id.clone(), component);
        if replaced.is_none() {
            inner.order.push(id);
        }
        replaced
    }

    /// Remove the component mounted under `id`.
    pub fn unmount(&self, id: &str) -> Option<Arc<dyn Component>> {
        let mut inner = self.inner.write();
        let removed = inner.by_id.remove(id);
        if removed.is_some() {
            inner.order.retain(|mounted| mounted.as_str() != id);
        }
        removed
    }

    /// Component mounted under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Component>> {
        self.inner.read().by_id.get(id).cloned()
    }

    /// Whether `id` is mounted.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().by_id.contains_key(id)
    }

    /// All mounted components in mount order.
    pub fn snapshot(&self) -> Vec<(ComponentId, Arc<dyn Component>)> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id).map(|c| (id.clone(), Arc::clone(c))))
            .collect()
    }

    /// Number of mounted components.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Whether nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }
}
