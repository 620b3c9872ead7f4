//! Events and listeners.
//!
//! Dispatch walks from the target up through its ancestors and finally to
//! document-level listeners, calling listeners registered for the event type
//! in registration order. `stop_propagation` halts the walk after the
//! current target.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Document, NodeId};

/// Callback invoked for a dispatched event.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Where a listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Document,
    Node(NodeId),
}

#[derive(Clone)]
pub(crate) struct Listener {
    id: ListenerId,
    target: EventTarget,
    kind: String,
    /// Element whose directive registered this listener.
    owner: Option<NodeId>,
    handler: Handler,
}

struct EventInner {
    kind: String,
    target: RwLock<Option<NodeId>>,
    default_prevented: AtomicBool,
    propagation_stopped: AtomicBool,
}

/// A dispatched event. Clones share state.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                kind: kind.into(),
                target: RwLock::new(None),
                default_prevented: AtomicBool::new(false),
                propagation_stopped: AtomicBool::new(false),
            }),
        }
    }

    /// The event type, e.g. `click`.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// The node the event was dispatched to.
    pub fn target(&self) -> Option<NodeId> {
        *self.inner.target.read()
    }

    pub fn prevent_default(&self) {
        self.inner.default_prevented.store(true, Ordering::SeqCst);
    }

    pub fn default_prevented(&self) -> bool {
        self.inner.default_prevented.load(Ordering::SeqCst)
    }

    pub fn stop_propagation(&self) {
        self.inner.propagation_stopped.store(true, Ordering::SeqCst);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.inner.propagation_stopped.load(Ordering::SeqCst)
    }

    pub fn ptr_eq(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind())
            .field("target", &self.target())
            .field("default_prevented", &self.default_prevented())
            .finish()
    }
}

impl Document {
    /// Register a listener.
    ///
    /// `owner` names the element whose directive created the listener; the
    /// lifecycle controller drops owned listeners when that element is torn
    /// down.
    pub fn add_listener<F>(
        &self,
        target: EventTarget,
        kind: &str,
        owner: Option<NodeId>,
        handler: F,
    ) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push(Listener {
            id,
            target,
            kind: kind.to_string(),
            owner,
            handler: Arc::new(handler),
        });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.write().retain(|l| l.id != id);
    }

    /// Drop every listener owned by, or attached to, one of `nodes`.
    pub(crate) fn remove_listeners_within(&self, nodes: &HashSet<NodeId>) {
        self.inner.listeners.write().retain(|l| {
            let owned = l.owner.map(|o| nodes.contains(&o)).unwrap_or(false);
            let attached = matches!(l.target, EventTarget::Node(n) if nodes.contains(&n));
            !owned && !attached
        });
    }

    /// Drop every listener.
    pub(crate) fn clear_listeners(&self) {
        self.inner.listeners.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    fn listeners_for(&self, target: EventTarget, kind: &str) -> Vec<Handler> {
        self.inner
            .listeners
            .read()
            .iter()
            .filter(|l| l.target == target && l.kind == kind)
            .map(|l| l.handler.clone())
            .collect()
    }

    /// Dispatch `event` at `target`, bubbling to the document.
    ///
    /// No lock is held while handlers run, so handlers may freely mutate the
    /// document or register further listeners.
    pub fn dispatch_event(&self, target: NodeId, event: &Event) {
        *event.inner.target.write() = Some(target);
        for node in self.ancestors(target) {
            for handler in self.listeners_for(EventTarget::Node(node), event.kind()) {
                handler(event);
            }
            if event.propagation_stopped() {
                return;
            }
        }
        for handler in self.listeners_for(EventTarget::Document, event.kind()) {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn events_bubble_to_document() {
        let doc = Document::parse("<div><button>x</button></div>");
        let div = doc.query_selector(doc.root(), "div").unwrap();
        let button = doc.query_selector(doc.root(), "button").unwrap();

        let calls = Arc::new(AtomicI32::new(0));
        for target in [EventTarget::Node(div), EventTarget::Document] {
            let calls = calls.clone();
            doc.add_listener(target, "click", None, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        let event = Event::new("click");
        doc.dispatch_event(button, &event);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(event.target(), Some(button));
    }

    #[test]
    fn stop_propagation_halts_bubbling() {
        let doc = Document::parse("<div><button>x</button></div>");
        let div = doc.query_selector(doc.root(), "div").unwrap();
        let button = doc.query_selector(doc.root(), "button").unwrap();

        let outer = Arc::new(AtomicI32::new(0));
        doc.add_listener(EventTarget::Node(button), "click", None, |e| e.stop_propagation());
        let outer_clone = outer.clone();
        doc.add_listener(EventTarget::Node(div), "click", None, move |_| {
            outer_clone.fetch_add(1, Ordering::SeqCst);
        });

        doc.dispatch_event(button, &Event::new("click"));
        assert_eq!(outer.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn owned_listeners_are_removed() {
        let doc = Document::parse("<div></div>");
        let div = doc.query_selector(doc.root(), "div").unwrap();
        doc.add_listener(EventTarget::Document, "click", Some(div), |_| {});
        doc.add_listener(EventTarget::Node(div), "input", None, |_| {});
        doc.add_listener(EventTarget::Document, "click", None, |_| {});
        assert_eq!(doc.listener_count(), 3);

        doc.remove_listeners_within(&HashSet::from([div]));
        assert_eq!(doc.listener_count(), 1);
    }
}
