//! Watcher types for the reactive system.
//!
//! A Watcher is a callback subscribed to one property of one instance. It
//! runs after every write that changes the value, receiving the new and the
//! old value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::value::Value;

/// Unique identifier for a watcher.
///
/// Returned from [`Proxy::watch`](super::Proxy::watch) and accepted by
/// [`Proxy::unwatch`](super::Proxy::unwatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique watcher ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked with `(new, old)`.
pub type WatchFn = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// A registered watcher.
#[derive(Clone)]
pub struct Watcher {
    id: WatcherId,
    callback: WatchFn,
}

impl Watcher {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        Self {
            id: WatcherId::new(),
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Invoke the callback.
    pub fn notify(&self, new: &Value, old: &Value) {
        (self.callback)(new, old);
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").field("id", &self.id).finish()
    }
}
