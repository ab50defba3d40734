//! Event handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::frame::{ChannelEvent, EventKind};

/// A subscribed callback. Runs synchronously on the dispatching task.
pub type EventHandler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Handle returned by [`SubscriptionRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handlers per event kind, kept in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(SubscriptionId, EventHandler)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for list in self.handlers.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Snapshot of the handlers for `kind`, in registration order.
    ///
    /// Callers invoke the returned handlers after releasing any lock on the
    /// registry, so a handler may itself subscribe.
    pub fn handlers_for(&self, kind: EventKind) -> Vec<EventHandler> {
        self.handlers
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn handlers_keep_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        for label in ["first", "second", "third"] {
            let calls = calls.clone();
            registry.subscribe(
                EventKind::Error,
                Arc::new(move |_| calls.lock().unwrap().push(label)),
            );
        }

        let event = ChannelEvent::error("x");
        for handler in registry.handlers_for(EventKind::Error) {
            handler(&event);
        }
        assert_eq!(*calls.lock().unwrap(), ["first", "second", "third"]);
        assert!(registry.handlers_for(EventKind::Message).is_empty());
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let mut registry = SubscriptionRegistry::new();
        let a = registry.subscribe(EventKind::Message, Arc::new(|_| {}));
        registry.subscribe(EventKind::Message, Arc::new(|_| {}));

        assert!(registry.unsubscribe(a));
        assert!(!registry.unsubscribe(a));
        assert_eq!(registry.len(), 1);
    }
}
