//! Runtime
//!
//! The runtime is the central coordinator. It owns the document, the
//! registries of definitions and live instances, the task scheduler and the
//! queue of pending collection operations.
//!
//! # How It Works
//!
//! 1. Components and stores are registered by name before `start`.
//!
//! 2. `start` instantiates the stores, scans the document for directives,
//!    begins observing mutations and then calls every `init` hook.
//!
//! 3. From then on, every child-list mutation is delivered to the lifecycle
//!    controller at the next checkpoint. Added subtrees are hydrated and
//!    removed subtrees are torn down.
//!
//! # Checkpoints
//!
//! There is no event loop. Deferred work runs when the runtime is driven:
//! [`Runtime::flush`] drains microtasks and mutation records,
//! [`Runtime::frame`] runs one animation frame and [`Runtime::advance`]
//! moves the virtual clock. Dispatching an event and polling a
//! [`Completion`] both end in a checkpoint.
//!
//! # Thread Safety
//!
//! The runtime is `Send + Sync` and cheap to clone. Registries live in
//! `DashMap`s; everything else sits behind `parking_lot` locks that are
//! never held while user callbacks run.

mod definition;
mod lifecycle;
mod pending;
mod scheduler;

pub use definition::Definition;
pub use pending::Completion;
pub use scheduler::{Scheduler, Task, TimerId};

pub(crate) use pending::PendingOps;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::dom::{Document, Event, NodeId};
use crate::error::{Error, Result};
use crate::expr;
use crate::history::History;
use crate::reactive::{ItemCollection, Proxy, WatcherId};
use crate::request::Transport;
use crate::value::{Record, Value};

/// The directive families an element can be bound for. Each element is
/// processed at most once per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Directive {
    Component,
    Item,
    Bind,
    Event,
    Show,
    Link,
    Load,
}

pub(crate) struct RuntimeInner {
    config: Config,
    document: Document,
    definitions: DashMap<String, Definition>,
    store_definitions: RwLock<IndexMap<String, Record>>,
    stores: DashMap<String, Proxy>,
    instances: DashMap<String, Proxy>,
    components: RwLock<IndexMap<NodeId, Proxy>>,
    items: RwLock<HashMap<NodeId, (Proxy, ItemCollection)>>,
    bound: Mutex<HashSet<(NodeId, Directive)>>,
    transitions: Mutex<HashMap<NodeId, u64>>,
    next_ref: AtomicU64,
    next_transition: AtomicU64,
    started: AtomicBool,
    draining: AtomicBool,
    scheduler: Scheduler,
    pending: PendingOps,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    history: Mutex<History>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a CuboMX runtime bound to one document.
///
/// # Example
///
/// ```rust,ignore
/// let document = Document::parse(r#"<div mx-data="counter"><span :text="n">0</span></div>"#);
/// let runtime = Runtime::new(document);
/// runtime.component("counter", Record::new().with("n", 0))?;
/// runtime.start();
/// runtime.eval("CuboMX.counter.n = 5")?;
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// A non-owning runtime handle, held by proxies, listeners and tasks.
#[derive(Clone, Default)]
pub struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl std::fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakRuntime")
    }
}

/// Clears the draining flag even if a callback panics.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new(document: Document) -> Self {
        Self::with_config(document, Config::default())
    }

    pub fn with_config(document: Document, config: Config) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                document,
                definitions: DashMap::new(),
                store_definitions: RwLock::new(IndexMap::new()),
                stores: DashMap::new(),
                instances: DashMap::new(),
                components: RwLock::new(IndexMap::new()),
                items: RwLock::new(HashMap::new()),
                bound: Mutex::new(HashSet::new()),
                transitions: Mutex::new(HashMap::new()),
                next_ref: AtomicU64::new(1),
                next_transition: AtomicU64::new(1),
                started: AtomicBool::new(false),
                draining: AtomicBool::new(false),
                scheduler: Scheduler::new(),
                pending: PendingOps::default(),
                transport: RwLock::new(None),
                history: Mutex::new(History::default()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn document(&self) -> Document {
        self.inner.document.clone()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn pending(&self) -> &PendingOps {
        &self.inner.pending
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a component definition.
    ///
    /// Names are shared with stores. A name that is already taken is
    /// rejected and the earlier registration stays in effect.
    pub fn component(&self, name: &str, definition: impl Into<Definition>) -> Result<()> {
        self.claim_name(name)?;
        let definition = definition.into();
        debug!(name, factory = definition.is_factory(), "component registered");
        self.inner.definitions.insert(name.to_string(), definition);
        Ok(())
    }

    /// Register a global store. Registering after `start` creates it and
    /// runs its `init` hook at once.
    pub fn store(&self, name: &str, record: Record) -> Result<()> {
        self.claim_name(name)?;
        self.inner
            .store_definitions
            .write()
            .insert(name.to_string(), record.clone());
        debug!(name, "store registered");
        if self.is_started() {
            let proxy = self.instantiate_store(name, record);
            proxy.run_hook("init");
            self.flush();
        }
        Ok(())
    }

    fn claim_name(&self, name: &str) -> Result<()> {
        let taken = self.inner.definitions.contains_key(name)
            || self.inner.store_definitions.read().contains_key(name);
        if taken {
            let err = Error::NameCollision(name.to_string());
            error!(error = %err, "registration rejected");
            return Err(err);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// A live store or component by global name.
    pub fn instance(&self, name: &str) -> Option<Proxy> {
        if let Some(store) = self.inner.stores.get(name) {
            return Some(store.value().clone());
        }
        self.inner.instances.get(name).map(|p| p.value().clone())
    }

    /// Names of every live store and component.
    pub fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .stores
            .iter()
            .map(|e| e.key().clone())
            .chain(self.inner.instances.iter().map(|e| e.key().clone()))
            .collect();
        names.sort();
        names
    }

    /// The component whose element is `el` or its nearest ancestor.
    pub fn owner_of(&self, el: NodeId) -> Option<Proxy> {
        let components = self.inner.components.read();
        self.inner
            .document
            .ancestors(el)
            .into_iter()
            .find_map(|node| components.get(&node).cloned())
    }

    /// The item whose element is `el` or its nearest ancestor.
    pub fn item_of(&self, el: NodeId) -> Option<Proxy> {
        let items = self.inner.items.read();
        self.inner
            .document
            .ancestors(el)
            .into_iter()
            .find_map(|node| items.get(&node).map(|(p, _)| p.clone()))
    }

    pub(crate) fn item_at(&self, el: NodeId) -> Option<(Proxy, ItemCollection)> {
        self.inner.items.read().get(&el).cloned()
    }

    /// Watch `name.prop` (a leading `$` is accepted).
    pub fn watch<F>(&self, path: &str, callback: F) -> Result<WatcherId>
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let path = path.strip_prefix('$').unwrap_or(path);
        let (name, prop) = path
            .split_once('.')
            .ok_or_else(|| Error::MalformedTarget(path.to_string()))?;
        let proxy = self
            .instance(name)
            .ok_or_else(|| Error::UnknownInstance(name.to_string()))?;
        Ok(proxy.watch(prop, callback))
    }

    /// Evaluate an expression in the global scope.
    pub fn eval(&self, source: &str) -> Result<Value> {
        let program = expr::parse(source)?;
        let result = expr::evaluate(&program, &expr::Scope::global(self));
        self.flush();
        result
    }

    // ------------------------------------------------------------------
    // Driving the runtime
    // ------------------------------------------------------------------

    /// Dispatch an event and run a checkpoint.
    pub fn dispatch(&self, target: NodeId, event: &Event) {
        self.inner.document.dispatch_event(target, event);
        self.flush();
    }

    /// Run a checkpoint: drain microtasks and deliver mutation records until
    /// both are empty.
    ///
    /// Returns `false` if a checkpoint was already running further up the
    /// stack, in which case that one finishes the work.
    pub fn flush(&self) -> bool {
        if self.inner.draining.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _guard = DrainGuard(&self.inner.draining);
        loop {
            let ran = self.inner.scheduler.run_microtasks();
            let records = self.inner.document.take_records();
            if records.is_empty() {
                if ran == 0 {
                    break;
                }
                continue;
            }
            self.process_records(records);
        }
        true
    }

    /// Run one animation frame, then a checkpoint.
    pub fn frame(&self) {
        for task in self.inner.scheduler.take_frame() {
            task();
        }
        self.flush();
    }

    /// Move the virtual clock forward, firing due timers in order.
    pub fn advance(&self, by: Duration) {
        let until = self.inner.scheduler.now() + by;
        while let Some(task) = self.inner.scheduler.pop_due(until) {
            task();
            self.flush();
        }
        self.inner.scheduler.set_now(until);
        self.flush();
    }

    /// Wait for every background request to finish, then run a checkpoint.
    pub async fn idle(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.tasks.lock());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                if let Err(err) = task.await {
                    warn!(error = %err, "background task failed");
                }
            }
        }
        self.flush();
    }

    pub(crate) fn spawn<F>(&self, what: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(future);
                self.inner.tasks.lock().push(task);
            }
            Err(_) => error!(task = what, "no tokio runtime available; task dropped"),
        }
    }

    // ------------------------------------------------------------------
    // Transport and history
    // ------------------------------------------------------------------

    /// Install the transport used by links, loads and navigation.
    pub fn set_transport(&self, transport: impl Transport + 'static) {
        *self.inner.transport.write() = Some(Arc::new(transport));
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner.transport.read().clone()
    }

    pub(crate) fn history(&self) -> &Mutex<History> {
        &self.inner.history
    }

    // ------------------------------------------------------------------
    // Bookkeeping for directives
    // ------------------------------------------------------------------

    /// Mark `node` as processed for `directive`. Returns `false` if it
    /// already was.
    pub(crate) fn mark(&self, node: NodeId, directive: Directive) -> bool {
        self.inner.bound.lock().insert((node, directive))
    }

    pub(crate) fn next_ref(&self) -> u64 {
        self.inner.next_ref.fetch_add(1, Ordering::Relaxed)
    }

    /// Start a new transition on `el`, invalidating any in flight.
    pub(crate) fn begin_transition(&self, el: NodeId) -> u64 {
        let token = self.inner.next_transition.fetch_add(1, Ordering::Relaxed);
        self.inner.transitions.lock().insert(el, token);
        token
    }

    pub(crate) fn transition_current(&self, el: NodeId, token: u64) -> bool {
        self.inner.transitions.lock().get(&el) == Some(&token)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("started", &self.is_started())
            .field("stores", &self.inner.stores.len())
            .field("instances", &self.inner.instances.len())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
