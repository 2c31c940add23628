//! Subscription registry
//!
//! Maps an event type to the ordered list of handlers subscribed to it.
//! Handlers are async callbacks receiving the frame's `data` payload. An
//! event type with no handlers is never kept around: removing the last
//! handler removes the type itself, so `event_types()` only lists types
//! somebody is actually listening to.
//!
//! # Examples
//!
//! ```rust
//! use wirebus_client::SubscriptionRegistry;
//!
//! let registry = SubscriptionRegistry::new();
//! let id = registry.register("metrics_update", |data| async move {
//!     println!("{}", data);
//! });
//!
//! assert!(registry.contains("metrics_update"));
//! registry.remove("metrics_update", id);
//! assert!(!registry.contains("metrics_update"));
//! ```

use crate::connection_state::lock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Type for event handler functions
pub type HandlerFn =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Identifies one registration, so the same closure may be added twice
/// and removed independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Event type → handlers, in registration order
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    handlers: Arc<Mutex<HashMap<String, Vec<(HandlerId, HandlerFn)>>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event_type`
    pub fn register<F, Fut>(&self, event_type: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |data| Box::pin(handler(data)));
        self.register_fn(event_type, handler)
    }

    /// Append an already boxed handler
    pub fn register_fn(&self, event_type: impl Into<String>, handler: HandlerFn) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers)
            .entry(event_type.into())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove one registration; drops the event type when it was the last
    pub fn remove(&self, event_type: &str, id: HandlerId) -> bool {
        let mut handlers = lock(&self.handlers);
        let Some(list) = handlers.get_mut(event_type) else {
            return false;
        };

        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }

    /// Snapshot of the handlers for `event_type`, in registration order
    ///
    /// The lock is released before the caller invokes anything, so handlers
    /// may subscribe or unsubscribe while being dispatched.
    pub fn handlers_for(&self, event_type: &str) -> Vec<HandlerFn> {
        lock(&self.handlers)
            .get(event_type)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    /// Whether anyone is subscribed to `event_type`
    pub fn contains(&self, event_type: &str) -> bool {
        lock(&self.handlers).contains_key(event_type)
    }

    /// Number of handlers registered for `event_type`
    pub fn handler_count(&self, event_type: &str) -> usize {
        lock(&self.handlers).get(event_type).map_or(0, Vec::len)
    }

    /// All event types with at least one handler
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = lock(&self.handlers).keys().cloned().collect();
        types.sort();
        types
    }

    /// Whether no handlers are registered at all
    pub fn is_empty(&self) -> bool {
        lock(&self.handlers).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            registry.register("tick", move |data| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(format!("{}:{}", tag, data));
                }
            });
        }

        for handler in registry.handlers_for("tick") {
            handler(json!(1)).await;
        }

        assert_eq!(*seen.lock().unwrap(), vec!["first:1", "second:1", "third:1"]);
    }

    #[test]
    fn test_last_removal_drops_event_type() {
        let registry = SubscriptionRegistry::new();
        let a = registry.register("alerts", |_| async {});
        let b = registry.register("alerts", |_| async {});
        assert_eq!(registry.handler_count("alerts"), 2);

        assert!(registry.remove("alerts", a));
        assert!(registry.contains("alerts"));

        assert!(registry.remove("alerts", b));
        assert!(!registry.contains("alerts"));
        assert!(registry.event_types().is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let id = registry.register("alerts", |_| async {});

        assert!(registry.remove("alerts", id));
        assert!(!registry.remove("alerts", id));
        assert!(!registry.remove("never_registered", id));
    }

    #[test]
    fn test_same_closure_registered_twice() {
        let registry = SubscriptionRegistry::new();
        let handler: HandlerFn = Arc::new(|_| Box::pin(async {}));

        let first = registry.register_fn("tick", Arc::clone(&handler));
        let second = registry.register_fn("tick", handler);
        assert_ne!(first, second);
        assert_eq!(registry.handler_count("tick"), 2);

        registry.remove("tick", first);
        assert_eq!(registry.handler_count("tick"), 1);
    }

    #[test]
    fn test_event_types() {
        let registry = SubscriptionRegistry::new();
        registry.register("b_type", |_| async {});
        registry.register("a_type", |_| async {});

        assert_eq!(registry.event_types(), vec!["a_type", "b_type"]);
        assert!(registry.handlers_for("missing").is_empty());
    }
}
