//! Ordered multi-subscriber callback lists.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Process-wide so identifiers from different lists never collide.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies a registered handler so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Handlers invoked synchronously in registration order.
pub(crate) struct Subscribers<A: ?Sized> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<A>)>>,
}

impl<A: ?Sized> Default for Subscribers<A> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl<A: ?Sized> Subscribers<A> {
    pub(crate) fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Returns whether `id` was registered.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub(crate) fn notify(&self, arg: &A) {
        // Snapshot so handlers may (un)subscribe without deadlocking
        let snapshot: Vec<Handler<A>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            handler(arg);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handlers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_runs_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscribers = Subscribers::<str>::default();

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            subscribers.subscribe(move |text: &str| seen.lock().push(format!("{tag}:{text}")));
        }

        subscribers.notify("tick");

        assert_eq!(
            *seen.lock(),
            vec!["first:tick", "second:tick", "third:tick"]
        );
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscribers = Subscribers::<str>::default();

        let seen_a = Arc::clone(&seen);
        let a = subscribers.subscribe(move |_: &str| seen_a.lock().push("a"));
        let seen_b = Arc::clone(&seen);
        subscribers.subscribe(move |_: &str| seen_b.lock().push("b"));

        assert!(subscribers.unsubscribe(a), "a was registered");
        assert!(!subscribers.unsubscribe(a), "a is already gone");

        subscribers.notify("x");

        assert_eq!(*seen.lock(), vec!["b"]);
        assert_eq!(subscribers.len(), 1);
    }

    #[test]
    fn handler_may_subscribe_during_notify() {
        let subscribers = Arc::new(Subscribers::<()>::default());
        let inner = Arc::clone(&subscribers);

        subscribers.subscribe(move |_: &()| {
            inner.subscribe(|_: &()| {});
        });

        subscribers.notify(&());

        assert_eq!(subscribers.len(), 2);
    }
}
