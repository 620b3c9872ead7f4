//! Proxy Implementation
//!
//! A Proxy is the live handle to one instance's state: a store, a component
//! or a list item. Reads return the stored value; writes store the value and
//! notify whatever is bound to the property.
//!
//! # How Writes Work
//!
//! 1. Properties starting with `$` are reserved. Writes to them are ignored.
//!
//! 2. A property holding an item collection cannot be replaced. The write is
//!    logged and dropped.
//!
//! 3. A property holding a class list keeps its list. A string or array
//!    written to it replaces the list's contents instead.
//!
//! 4. A string or array written to a property that drives a `class`
//!    binding is wrapped in a new class list first.
//!
//! 5. The value is stored. If it is not `===` to the previous value, the
//!    property's reactions run in registration order, then its watchers.
//!
//! # Thread Safety
//!
//! The record, the reaction lists and the watcher lists each sit behind a
//! `parking_lot::RwLock`. Lists are cloned out before anything is invoked,
//! so reactions and watchers may write back into the same proxy.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{error, trace, warn};

use super::class_list::{class_names_of, ClassList};
use super::reaction::{Effect, Reaction};
use super::watcher::{Watcher, WatcherId};
use crate::dom::NodeId;
use crate::error::{Error, Result};
use crate::runtime::{Runtime, WeakRuntime};
use crate::value::{CallContext, Function, Record, Value};

/// Counter for generating unique proxy IDs.
static PROXY_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// What kind of instance a proxy fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKind {
    /// A global store: no element, never destroyed until reset.
    Store,
    /// A component hydrated from an `mx-data` element.
    Component,
    /// One element of an item collection.
    Item,
}

type ReactionList = SmallVec<[Reaction; 2]>;

pub(crate) struct ProxyInner {
    id: u64,
    name: String,
    kind: InstanceKind,
    element: Option<NodeId>,
    record: RwLock<Record>,
    reactions: RwLock<IndexMap<String, ReactionList>>,
    watchers: RwLock<IndexMap<String, Vec<Watcher>>>,
    disposed: AtomicBool,
    runtime: WeakRuntime,
}

/// A reactive handle over an instance record.
///
/// Cloning the handle shares the instance.
///
/// # Example
///
/// ```rust,ignore
/// let counter = runtime.instance("counter").unwrap();
/// counter.set("n", 5);
/// assert_eq!(counter.get("n"), Value::from(5));
/// ```
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    pub(crate) fn new(
        name: impl Into<String>,
        kind: InstanceKind,
        element: Option<NodeId>,
        record: Record,
        runtime: WeakRuntime,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                id: PROXY_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                kind,
                element,
                record: RwLock::new(record),
                reactions: RwLock::new(IndexMap::new()),
                watchers: RwLock::new(IndexMap::new()),
                disposed: AtomicBool::new(false),
                runtime,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ProxyInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ProxyInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The global name, generated reference or item marker of the instance.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> InstanceKind {
        self.inner.kind
    }

    /// The root element, for components and items.
    pub fn element(&self) -> Option<NodeId> {
        self.inner.element
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read a property. Missing properties read as `undefined`.
    ///
    /// `$el` and `$watch` are virtual: the root element and a function that
    /// registers a watcher on this instance.
    pub fn get(&self, prop: &str) -> Value {
        match prop {
            "$el" => return self.inner.element.map(Value::Element).unwrap_or(Value::Null),
            "$watch" => return self.watch_function(),
            _ => {}
        }
        self.inner
            .record
            .read()
            .get(prop)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    /// Does the record hold `prop`?
    pub fn has(&self, prop: &str) -> bool {
        self.inner.record.read().contains_key(prop)
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> Record {
        self.inner.record.read().clone()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a property and notify its reactions and watchers.
    ///
    /// Always reports success; refused writes are logged instead.
    pub fn set(&self, prop: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if prop.starts_with('$') {
            warn!(instance = %self.name(), prop, "ignoring write to reserved property");
            return true;
        }

        let old = self.get(prop);
        match &old {
            Value::Collection(_) => {
                let err = Error::CollectionReplacement {
                    prop: prop.to_string(),
                };
                error!(instance = %self.name(), error = %err, "write refused");
                return true;
            }
            Value::ClassList(list) => {
                if matches!(&value, Value::ClassList(other) if other.ptr_eq(list)) {
                    return true;
                }
                match class_names_of(&value) {
                    Some(names) => list.replace(names),
                    None => {
                        let err = Error::ClassListType {
                            prop: prop.to_string(),
                            found: value.type_name(),
                        };
                        error!(instance = %self.name(), error = %err, "write refused");
                    }
                }
                return true;
            }
            _ => {}
        }

        let value = match class_names_of(&value) {
            Some(names) if !matches!(value, Value::ClassList(_)) && self.has_class_reaction(prop) => {
                Value::ClassList(ClassList::new(self, prop, names))
            }
            _ => value,
        };

        self.inner.record.write().insert(prop, value.clone());
        if value.strict_eq(&old) {
            trace!(instance = %self.name(), prop, "unchanged write");
            return true;
        }
        self.notify(prop, &value, &old);
        true
    }

    /// Store a value without notifying anyone.
    pub(crate) fn define(&self, prop: &str, value: Value) {
        self.inner.record.write().insert(prop, value);
    }

    fn notify(&self, prop: &str, new: &Value, old: &Value) {
        let reactions = self.reactions_for(prop);
        if !reactions.is_empty() {
            if let Some(runtime) = self.runtime() {
                for reaction in &reactions {
                    reaction.apply(&runtime, new, true);
                }
            }
        }

        let watchers: Vec<Watcher> = self
            .inner
            .watchers
            .read()
            .get(prop)
            .cloned()
            .unwrap_or_default();
        for watcher in &watchers {
            watcher.notify(new, old);
        }
    }

    /// Re-run the reactions of `prop` with its current value.
    pub(crate) fn rerender(&self, prop: &str) {
        let reactions = self.reactions_for(prop);
        if reactions.is_empty() {
            return;
        }
        let value = self.get(prop);
        if let Some(runtime) = self.runtime() {
            for reaction in &reactions {
                reaction.apply(&runtime, &value, true);
            }
        }
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    /// Invoke a function-valued property with `this` bound to the instance.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let Value::Function(function) = self.get(method) else {
            return Err(Error::eval(format!("{}.{method} is not a function", self.name())));
        };
        let runtime = self
            .runtime()
            .ok_or_else(|| Error::eval("runtime is no longer alive"))?;
        let cx = CallContext {
            runtime: &runtime,
            this: Some(self),
        };
        function.call(&cx, args)
    }

    /// Call a lifecycle hook if the record defines one. Failures are logged.
    pub(crate) fn run_hook(&self, hook: &str) {
        if !matches!(self.get(hook), Value::Function(_)) {
            return;
        }
        if let Err(err) = self.call(hook, &[]) {
            error!(instance = %self.name(), hook, error = %err, "lifecycle hook failed");
        }
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    /// Run `callback(new, old)` after every change of `prop`.
    pub fn watch<F>(&self, prop: &str, callback: F) -> WatcherId
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let watcher = Watcher::new(callback);
        let id = watcher.id();
        self.inner
            .watchers
            .write()
            .entry(prop.to_string())
            .or_default()
            .push(watcher);
        id
    }

    /// Remove a watcher. Returns whether it was registered here.
    pub fn unwatch(&self, id: WatcherId) -> bool {
        let mut watchers = self.inner.watchers.write();
        let mut found = false;
        for list in watchers.values_mut() {
            let before = list.len();
            list.retain(|w| w.id() != id);
            found |= list.len() != before;
        }
        found
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.read().values().map(Vec::len).sum()
    }

    fn watch_function(&self) -> Value {
        let this = self.downgrade();
        Value::Function(Function::new(move |cx, args| {
            let Some(inner) = this.upgrade() else {
                return Ok(Value::Undefined);
            };
            let proxy = Proxy::from_inner(inner);
            let prop = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| Error::eval("$watch expects a property name"))?
                .to_string();
            let Some(Value::Function(callback)) = args.get(1).cloned() else {
                return Err(Error::eval("$watch expects a callback"));
            };

            let runtime = cx.runtime.downgrade();
            let target = proxy.downgrade();
            let watched = prop.clone();
            proxy.watch(&prop, move |new, old| {
                let (Some(runtime), Some(target)) = (runtime.upgrade(), target.upgrade()) else {
                    return;
                };
                let this = Proxy::from_inner(target);
                let cx = CallContext {
                    runtime: &runtime,
                    this: Some(&this),
                };
                if let Err(err) = callback.call(&cx, &[new.clone(), old.clone()]) {
                    error!(instance = %this.name(), prop = %watched, error = %err, "watcher failed");
                }
            });
            Ok(Value::Undefined)
        }))
    }

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    pub(crate) fn add_reaction(&self, prop: &str, reaction: Reaction) {
        self.inner
            .reactions
            .write()
            .entry(prop.to_string())
            .or_default()
            .push(reaction);
    }

    fn reactions_for(&self, prop: &str) -> ReactionList {
        self.inner
            .reactions
            .read()
            .get(prop)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn has_class_reaction(&self, prop: &str) -> bool {
        self.inner
            .reactions
            .read()
            .get(prop)
            .map(|list| list.iter().any(|r| matches!(r.effect(), Effect::Class)))
            .unwrap_or(false)
    }

    /// Keep only the reactions for which `keep` returns true.
    pub(crate) fn retain_reactions(&self, keep: impl Fn(&Reaction) -> bool) {
        let mut reactions = self.inner.reactions.write();
        for list in reactions.values_mut() {
            list.retain(|r| keep(r));
        }
        reactions.retain(|_, list| !list.is_empty());
    }

    /// Number of reactions bound to `prop`.
    pub fn reaction_count(&self, prop: &str) -> usize {
        self.inner
            .reactions
            .read()
            .get(prop)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Drop every reaction and watcher. The record stays readable.
    pub(crate) fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.reactions.write().clear();
        self.inner.watchers.write().clear();
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("element", &self.inner.element)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    fn detached(record: Record) -> Proxy {
        Proxy::new("test", InstanceKind::Store, None, record, WeakRuntime::default())
    }

    #[test]
    fn get_and_set() {
        let proxy = detached(Record::new().with("n", 0));
        assert_eq!(proxy.get("n"), Value::from(0));
        assert!(proxy.set("n", 5));
        assert_eq!(proxy.get("n"), Value::from(5));
        assert_eq!(proxy.get("missing"), Value::Undefined);
    }

    #[test]
    fn watchers_fire_only_on_change() {
        let proxy = detached(Record::new().with("n", 0));
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        proxy.watch("n", move |new, old| {
            assert_ne!(new, old);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        proxy.set("n", 1);
        proxy.set("n", 1);
        proxy.set("n", 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unwatch_stops_notifications() {
        let proxy = detached(Record::new());
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let id = proxy.watch("x", move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        proxy.set("x", "a");
        assert!(proxy.unwatch(id));
        assert!(!proxy.unwatch(id));
        proxy.set("x", "b");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reserved_properties_are_read_only() {
        let proxy = detached(Record::new());
        proxy.set("$el", 1);
        assert_eq!(proxy.get("$el"), Value::Null);
        assert!(!proxy.has("$el"));
    }

    #[test]
    fn class_binding_wraps_strings() {
        let proxy = detached(Record::new());
        proxy.add_reaction("cls", Reaction::new(NodeId::from_raw(1), Effect::Class));
        proxy.set("cls", "a b");

        let list = proxy.get("cls");
        let list = list.as_class_list().expect("wrapped");
        assert_eq!(list.to_vec(), vec!["a", "b"]);

        // Later writes replace the contents of the same list.
        proxy.set("cls", Value::array(vec!["c".into()]));
        assert!(proxy.get("cls").strict_eq(&Value::ClassList(list.clone())));
        assert_eq!(list.to_vec(), vec!["c"]);

        // Non-string values are refused.
        proxy.set("cls", 5);
        assert_eq!(list.to_vec(), vec!["c"]);
    }

    #[test]
    fn dispose_clears_watchers() {
        let proxy = detached(Record::new());
        proxy.watch("a", |_, _| {});
        proxy.watch("b", |_, _| {});
        assert_eq!(proxy.watcher_count(), 2);
        proxy.dispose();
        assert_eq!(proxy.watcher_count(), 0);
        assert!(proxy.is_disposed());
    }

    #[test]
    fn call_without_runtime_fails() {
        let proxy = detached(Record::new().method("go", |_, _| Ok(Value::from(1))));
        assert!(proxy.call("go", &[]).is_err());
        assert!(proxy.call("missing", &[]).is_err());
    }
}
