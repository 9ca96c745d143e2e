//! Multi-subscriber signal with RAII subscriptions

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle for one connected handler
    pub struct HandlerKey;
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    name: &'static str,
    handlers: Mutex<SlotMap<HandlerKey, Handler<T>>>,
}

/// Type-erased view used by [`Subscription`] to disconnect itself
trait Detach: Send + Sync {
    fn detach(&self, key: HandlerKey);
    fn contains(&self, key: HandlerKey) -> bool;
}

impl<T: 'static> Detach for Slots<T> {
    fn detach(&self, key: HandlerKey) {
        self.handlers.lock().remove(key);
    }

    fn contains(&self, key: HandlerKey) -> bool {
        self.handlers.lock().contains_key(key)
    }
}

/// A named signal carrying `&T` to every connected handler
///
/// Cloning an `Event` yields another handle to the same handler list.
pub struct Event<T> {
    inner: Arc<Slots<T>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Event<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(Slots {
                name,
                handlers: Mutex::new(SlotMap::with_key()),
            }),
        }
    }

    /// Connect a handler; it stays connected until the returned
    /// [`Subscription`] is dropped
    #[must_use = "dropping the Subscription disconnects the handler immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let key = self.inner.handlers.lock().insert(Arc::new(handler));
        let weak: Weak<Slots<T>> = Arc::downgrade(&self.inner);
        let slots: Weak<dyn Detach> = weak;
        Subscription {
            slots: Some(slots),
            key,
        }
    }

    /// Invoke every handler connected at the time of the call
    ///
    /// Handlers run outside the lock, so they may subscribe or unsubscribe.
    /// A handler removed mid-dispatch is skipped. A panicking handler is
    /// logged and the remaining handlers still run.
    pub fn emit(&self, args: &T) {
        let snapshot: Vec<(HandlerKey, Handler<T>)> = self
            .inner
            .handlers
            .lock()
            .iter()
            .map(|(key, handler)| (key, Arc::clone(handler)))
            .collect();

        for (key, handler) in snapshot {
            if !self.inner.contains(key) {
                continue;
            }

            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(args))) {
                tracing::error!(
                    "Handler for '{}' panicked: {}",
                    self.inner.name,
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    /// Number of connected handlers
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }

    /// Disconnect every handler
    pub fn clear(&self) {
        self.inner.handlers.lock().clear();
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

/// Connection to one handler; disconnects on drop
pub struct Subscription {
    slots: Option<Weak<dyn Detach>>,
    key: HandlerKey,
}

impl Subscription {
    /// Disconnect now
    pub fn unsubscribe(mut self) {
        self.disconnect();
    }

    /// Whether the handler is still connected
    pub fn is_connected(&self) -> bool {
        self.slots
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|slots| slots.contains(self.key))
            .unwrap_or(false)
    }

    /// Keep the handler connected for as long as the event lives
    pub fn forget(mut self) {
        self.slots = None;
    }

    fn disconnect(&mut self) {
        if let Some(slots) = self.slots.take().and_then(|weak| weak.upgrade()) {
            slots.detach(self.key);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
