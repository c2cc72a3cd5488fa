//! Namespaced publish/subscribe events.
//!
//! Names take the form `topic` or `topic:subtopic` and are matched
//! case-insensitively. Each owner (storage, manager) composes its own
//! [`EventBus`]; there is no process-wide registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: HashMap<String, Vec<Callback>>,
    /// Events raised with [`EventBus::trigger_once`].
    fired: HashSet<String>,
}

/// Per-instance event registry.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Option<Registry>>,
}

impl EventBus {
    /// Creates an empty bus. Handler storage is allocated on first `on`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback under `name`.
    ///
    /// If `name` was already raised with [`EventBus::trigger_once`], the
    /// callback runs immediately instead of being registered.
    pub fn on<F>(&self, name: &str, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = normalize(name);
        {
            let mut guard = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let registry = guard.get_or_insert_with(Registry::default);
            if !registry.fired.contains(&name) {
                registry
                    .handlers
                    .entry(name)
                    .or_default()
                    .push(Arc::new(callback));
                return;
            }
        }
        callback();
    }

    /// Invokes every callback registered under exactly `name`, in
    /// registration order. Returns the number of callbacks invoked.
    pub fn trigger(&self, name: &str) -> usize {
        self.dispatch(&normalize(name), false)
    }

    /// Like [`EventBus::trigger`], but the event stays raised: callbacks
    /// registered for it later run as soon as they are registered.
    pub fn trigger_once(&self, name: &str) -> usize {
        self.dispatch(&normalize(name), true)
    }

    fn dispatch(&self, name: &str, once: bool) -> usize {
        // Snapshot so callbacks can register further handlers.
        let callbacks: Vec<Callback> = {
            let mut guard = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            if once {
                let registry = guard.get_or_insert_with(Registry::default);
                if !registry.fired.insert(name.to_string()) {
                    return 0;
                }
                registry.handlers.remove(name).unwrap_or_default()
            } else {
                guard
                    .as_ref()
                    .and_then(|registry| registry.handlers.get(name))
                    .cloned()
                    .unwrap_or_default()
            }
        };

        for callback in &callbacks {
            callback();
        }

        callbacks.len()
    }

    /// Number of callbacks registered under `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        let guard = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .and_then(|registry| registry.handlers.get(&normalize(name)))
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let names: Vec<&String> = guard.iter().flat_map(|r| r.handlers.keys()).collect();
        f.debug_struct("EventBus").field("events", &names).finish()
    }
}

/// Lower-cases and keeps at most `topic:subtopic`.
fn normalize(name: &str) -> String {
    let name = name.trim().to_lowercase();
    let mut parts = name.split(':');
    let topic = parts.next().unwrap_or_default();
    match parts.next() {
        Some(subtopic) => format!("{}:{}", topic, subtopic),
        None => topic.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_trigger_invokes_registered_callbacks() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        bus.on("init", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.trigger("init"), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        bus.on("Sync:Done", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.trigger("sync:done");
        bus.trigger("SYNC:DONE");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exact_namespace_match() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        bus.on("sync:done", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.trigger("sync"), 0);
        assert_eq!(bus.trigger("sync:failed"), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_event_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.trigger("nothing"), 0);
        assert_eq!(bus.listener_count("nothing"), 0);
    }

    #[test]
    fn test_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let o = order.clone();
            bus.on("init", move || o.lock().unwrap().push(i));
        }

        bus.trigger("init");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_instances_are_independent() {
        let first = EventBus::new();
        let second = EventBus::new();
        first.on("init", || {});

        assert_eq!(first.listener_count("init"), 1);
        assert_eq!(second.listener_count("init"), 0);
    }

    #[test]
    fn test_callback_can_register_during_trigger() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        bus.on("init", move || inner.on("init", || {}));

        assert_eq!(bus.trigger("init"), 1);
        assert_eq!(bus.listener_count("init"), 2);
    }

    #[test]
    fn test_trigger_once_runs_late_callbacks_immediately() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        bus.on("init", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.trigger_once("init"), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let c = count.clone();
        bus.on("Init", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(bus.listener_count("init"), 0);

        // Raised events do not fire again.
        assert_eq!(bus.trigger_once("init"), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
