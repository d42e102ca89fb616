//! Observer registry for timer state changes.
//!
//! Listeners are kept in registration order and removed by id, never by
//! comparing closures.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::state::TimerState;

pub type Listener = Arc<dyn Fn(&TimerState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl ListenerRegistry {
    pub(crate) fn insert(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Copy of the current listeners so they can be called without the lock.
    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

/// Handle returned by `TimerService::subscribe`.
///
/// Dropping it deregisters the listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, registry: &Arc<Mutex<ListenerRegistry>>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Deregister now. Same as dropping the handle.
    pub fn unsubscribe(self) {}

    fn detach(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut reg = registry.lock().unwrap_or_else(PoisonError::into_inner);
        reg.remove(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Listener {
        Arc::new(|_: &TimerState| {})
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let mut reg = ListenerRegistry::default();
        let a = reg.insert(noop());
        let b = reg.insert(noop());
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn remove_by_id_leaves_identical_closures_alone() {
        let shared = noop();
        let mut reg = ListenerRegistry::default();
        let a = reg.insert(Arc::clone(&shared));
        let _b = reg.insert(Arc::clone(&shared));
        assert!(reg.remove(a));
        assert!(!reg.remove(a));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn dropping_subscription_deregisters() {
        let registry = Arc::new(Mutex::new(ListenerRegistry::default()));
        let id = registry.lock().unwrap().insert(noop());
        let sub = Subscription::new(id, &registry);
        assert_eq!(registry.lock().unwrap().len(), 1);
        sub.unsubscribe();
        assert_eq!(registry.lock().unwrap().len(), 0);
    }

    #[test]
    fn drop_deregisters_even_after_a_listener_panicked() {
        let registry = Arc::new(Mutex::new(ListenerRegistry::default()));
        let id = registry.lock().unwrap().insert(noop());
        let sub = Subscription::new(id, &registry);

        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("listener blew up");
        })
        .join();
        assert!(registry.is_poisoned());

        drop(sub);
        let reg = registry.lock().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = Arc::new(Mutex::new(ListenerRegistry::default()));
        let id = registry.lock().unwrap().insert(noop());
        let sub = Subscription::new(id, &registry);
        drop(registry);
        drop(sub);
    }
}
