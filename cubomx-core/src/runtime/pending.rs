//! Pending collection and swap operations.
//!
//! A mutation made through a collection or the swap engine registers the
//! nodes it touched here before touching the document. When the lifecycle
//! controller later processes the records for those nodes it resolves the
//! matching entry, which completes the caller's [`Completion`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use super::{Runtime, WeakRuntime};
use crate::dom::NodeId;
use crate::reactive::Proxy;
use crate::value::Record;

struct PendingHydration {
    tx: oneshot::Sender<Option<Proxy>>,
    seed: Option<Record>,
}

/// Operations waiting for the observer.
#[derive(Default)]
pub(crate) struct PendingOps {
    hydrations: Mutex<HashMap<NodeId, PendingHydration>>,
    teardowns: Mutex<HashMap<NodeId, oneshot::Sender<()>>>,
}

impl PendingOps {
    /// Expect `node` to be added. `seed` becomes the initial record of the
    /// item proxy hydrated from it.
    pub(crate) fn expect_hydration(
        &self,
        node: NodeId,
        seed: Option<Record>,
    ) -> oneshot::Receiver<Option<Proxy>> {
        let (tx, rx) = oneshot::channel();
        self.hydrations
            .lock()
            .insert(node, PendingHydration { tx, seed });
        rx
    }

    pub(crate) fn expect_teardown(&self, node: NodeId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.teardowns.lock().insert(node, tx);
        rx
    }

    /// The seed record registered for `node`, if any.
    pub(crate) fn seed_for(&self, node: NodeId) -> Option<Record> {
        self.hydrations
            .lock()
            .get(&node)
            .and_then(|p| p.seed.clone())
    }

    pub(crate) fn resolve_hydration(&self, node: NodeId, proxy: Option<Proxy>) {
        let pending = self.hydrations.lock().remove(&node);
        if let Some(pending) = pending {
            // The receiver may have been dropped; that is fine.
            let _ = pending.tx.send(proxy);
        }
    }

    pub(crate) fn resolve_teardown(&self, node: NodeId) {
        let pending = self.teardowns.lock().remove(&node);
        if let Some(tx) = pending {
            let _ = tx.send(());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.hydrations.lock().len() + self.teardowns.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.hydrations.lock().clear();
        self.teardowns.lock().clear();
    }
}

/// A future that resolves once the document changes made by a collection
/// method or a swap have been processed.
///
/// Resolves with the proxy the operation produced or removed, when there is
/// one. Polling drives the runtime: every poll runs a checkpoint, so the
/// future completes under any executor. Dropping it leaves the operation in
/// place.
#[must_use = "the operation has been applied; await it to observe the hydrated result"]
pub struct Completion {
    runtime: WeakRuntime,
    hydrations: Vec<oneshot::Receiver<Option<Proxy>>>,
    teardowns: Vec<oneshot::Receiver<()>>,
    result: Option<Proxy>,
}

impl Completion {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.downgrade(),
            hydrations: Vec::new(),
            teardowns: Vec::new(),
            result: None,
        }
    }

    /// An already settled completion.
    pub(crate) fn ready(result: Option<Proxy>) -> Self {
        Self {
            runtime: WeakRuntime::default(),
            hydrations: Vec::new(),
            teardowns: Vec::new(),
            result,
        }
    }

    pub(crate) fn with_result(mut self, proxy: Proxy) -> Self {
        self.result = Some(proxy);
        self
    }

    pub(crate) fn push_hydration(&mut self, rx: oneshot::Receiver<Option<Proxy>>) {
        self.hydrations.push(rx);
    }

    pub(crate) fn push_teardown(&mut self, rx: oneshot::Receiver<()>) {
        self.teardowns.push(rx);
    }

    /// Has every awaited node been processed?
    pub fn is_settled(&self) -> bool {
        self.hydrations.is_empty() && self.teardowns.is_empty()
    }

    fn poll_receivers(&mut self, cx: &mut Context<'_>) -> bool {
        let mut i = 0;
        while i < self.hydrations.len() {
            match Pin::new(&mut self.hydrations[i]).poll(cx) {
                Poll::Ready(result) => {
                    let proxy = result.ok().flatten();
                    if self.result.is_none() {
                        self.result = proxy;
                    }
                    self.hydrations.remove(i);
                }
                Poll::Pending => i += 1,
            }
        }
        let mut i = 0;
        while i < self.teardowns.len() {
            match Pin::new(&mut self.teardowns[i]).poll(cx) {
                Poll::Ready(_) => {
                    self.teardowns.remove(i);
                }
                Poll::Pending => i += 1,
            }
        }
        self.is_settled()
    }
}

impl Future for Completion {
    type Output = Option<Proxy>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if this.is_settled() {
            return Poll::Ready(this.result.take());
        }

        let drained = match this.runtime.upgrade() {
            Some(runtime) => runtime.flush(),
            None => true,
        };
        if this.poll_receivers(cx) {
            return Poll::Ready(this.result.take());
        }

        // A full checkpoint ran and the nodes were still not observed: the
        // change happened somewhere the observer cannot see.
        if drained {
            debug!(
                hydrations = this.hydrations.len(),
                teardowns = this.teardowns.len(),
                "completion settled without observing every node"
            );
            this.hydrations.clear();
            this.teardowns.clear();
            return Poll::Ready(this.result.take());
        }
        Poll::Pending
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("hydrations", &self.hydrations.len())
            .field("teardowns", &self.teardowns.len())
            .field("result", &self.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_completion_resolves_immediately() {
        assert!(Completion::ready(None).await.is_none());
    }

    #[tokio::test]
    async fn dropped_sender_resolves_as_none() {
        let ops = PendingOps::default();
        let rx = ops.expect_hydration(crate::dom::Document::new().root(), None);
        let mut completion = Completion::ready(None);
        completion.push_hydration(rx);
        ops.clear();
        assert!(completion.await.is_none());
    }

    #[test]
    fn seeds_are_kept_until_resolved() {
        let doc = crate::dom::Document::new();
        let node = doc.create_element("li");
        let ops = PendingOps::default();
        let _rx = ops.expect_hydration(node, Some(Record::new().with("a", 1)));
        assert!(ops.seed_for(node).is_some());
        ops.resolve_hydration(node, None);
        assert!(ops.seed_for(node).is_none());
        assert_eq!(ops.len(), 0);
    }
}
