use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Handle returned when registering a device listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Device-scoped listeners, separate from the channel's handler set.
pub(crate) struct ListenerSet<T> {
    next_id: AtomicU64,
    listeners: DashMap<u64, Listener<T>>,
}

impl<T: Copy> ListenerSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            listeners: DashMap::new(),
        }
    }

    pub(crate) fn add(&self, listener: impl Fn(T) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(listener));
        ListenerId(id)
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id.0).is_some()
    }

    pub(crate) fn notify(&self, value: T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }
}
