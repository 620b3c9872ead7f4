//! Lifecycle Controller
//!
//! Hydration turns marked-up elements into live instances and bindings;
//! teardown undoes it when the elements leave the document.
//!
//! # Hydration Order
//!
//! Within a subtree, directives are resolved family by family so that every
//! binding can find its owner:
//!
//! 1. `mx-data` components
//! 2. `mx-item` items (templates become stencils and leave the document)
//! 3. property bindings
//! 4. event bindings
//! 5. `mx-show`
//! 6. `mx-link`, then `mx-load`
//!
//! The `init` hooks of components created by the pass run after all of it.
//!
//! # Observation
//!
//! Records are processed in batches. All added nodes of a batch are handled
//! before any removed node, so an `init` triggered by a batch always runs
//! before a `destroy` from the same batch. A removed node that is still
//! connected was moved, not removed, and is left alone; likewise an added
//! node that is no longer connected is not hydrated.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use tracing::{debug, error, info, warn};

use super::{Definition, Directive, Runtime};
use crate::directive;
use crate::dom::{MutationRecord, NodeId};
use crate::error::Error;
use crate::reactive::{InstanceKind, ItemCollection, Proxy};
use crate::value::Record;

impl Runtime {
    /// Instantiate stores, hydrate the document, begin observing and call
    /// every `init` hook. Calling it twice does nothing.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("runtime already started");
            return;
        }

        let definitions: Vec<(String, Record)> = self
            .inner
            .store_definitions
            .read()
            .iter()
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();
        let stores: Vec<Proxy> = definitions
            .into_iter()
            .map(|(name, record)| self.instantiate_store(&name, record))
            .collect();

        let document = self.document();
        let components = self.hydrate(document.root());
        document.observe(true);

        for proxy in stores.iter().chain(components.iter()) {
            proxy.run_hook("init");
        }
        info!(
            stores = stores.len(),
            components = components.len(),
            "runtime started"
        );
        self.flush();
    }

    /// Stop observing and forget every registration, instance and binding.
    /// Destroy hooks are not called.
    pub fn reset(&self) {
        self.inner.started.store(false, Ordering::SeqCst);
        let document = self.document();
        document.observe(false);
        document.clear_listeners();

        for entry in self.inner.stores.iter() {
            entry.value().dispose();
        }
        for entry in self.inner.instances.iter() {
            entry.value().dispose();
        }
        let items: Vec<Proxy> = self
            .inner
            .items
            .read()
            .values()
            .map(|(p, _)| p.clone())
            .collect();
        for proxy in items {
            proxy.dispose();
        }

        self.inner.definitions.clear();
        self.inner.store_definitions.write().clear();
        self.inner.stores.clear();
        self.inner.instances.clear();
        self.inner.components.write().clear();
        self.inner.items.write().clear();
        self.inner.bound.lock().clear();
        self.inner.transitions.lock().clear();
        self.inner.scheduler.clear();
        self.inner.pending.clear();
        self.inner.history.lock().clear();
        for task in std::mem::take(&mut *self.inner.tasks.lock()) {
            task.abort();
        }
        debug!("runtime reset");
    }

    pub(super) fn instantiate_store(&self, name: &str, record: Record) -> Proxy {
        let proxy = Proxy::new(name, InstanceKind::Store, None, record, self.downgrade());
        self.inner.stores.insert(name.to_string(), proxy.clone());
        debug!(name, "store created");
        proxy
    }

    // ------------------------------------------------------------------
    // Hydration
    // ------------------------------------------------------------------

    /// Resolve every directive in the subtree rooted at `root`. Returns the
    /// components created, in document order.
    pub(crate) fn hydrate(&self, root: NodeId) -> Vec<Proxy> {
        let document = self.document();
        let elements = document.elements_within(root);
        let markers = &self.config().markers;

        let mut created = Vec::new();
        for &el in &elements {
            if document.has_attribute(el, &markers.data) && self.mark(el, Directive::Component) {
                if let Some(proxy) = self.instantiate_component(el) {
                    created.push(proxy);
                }
            }
        }

        for &el in &elements {
            if document.has_attribute(el, &markers.item) && document.is_connected(el) {
                directive::item::resolve(self, el);
            }
        }

        // Item templates may have left the document above.
        let elements: Vec<NodeId> = elements
            .into_iter()
            .filter(|el| document.is_connected(*el))
            .collect();

        for &el in &elements {
            directive::bind::resolve(self, el);
        }
        for &el in &elements {
            directive::on::resolve(self, el);
        }
        for &el in &elements {
            directive::show::resolve(self, el);
        }
        for &el in &elements {
            directive::link::resolve_link(self, el);
        }
        for &el in &elements {
            directive::link::resolve_load(self, el);
        }
        created
    }

    fn instantiate_component(&self, el: NodeId) -> Option<Proxy> {
        let document = self.document();
        let markers = &self.config().markers;
        let raw = document.attribute(el, &markers.data)?;
        let raw = raw.trim();
        let (name, factory_syntax) = match raw.strip_suffix("()") {
            Some(name) => (name.trim(), true),
            None => (raw, false),
        };

        let definition = self.inner.definitions.get(name).map(|d| d.value().clone());
        let Some(definition) = definition else {
            error!(element = %el, error = %Error::UnknownInstance(name.to_string()), "cannot hydrate component");
            return None;
        };

        let identity = match &definition {
            Definition::Singleton(_) => {
                if factory_syntax {
                    warn!(name, "singleton component referenced with factory syntax");
                }
                name.to_string()
            }
            Definition::Factory(_) => match document.attribute(el, &markers.reference) {
                Some(reference) if !reference.trim().is_empty() => reference.trim().to_string(),
                _ => self.generate_ref(name),
            },
        };

        if self.inner.stores.contains_key(&identity) || self.inner.instances.contains_key(&identity) {
            error!(element = %el, error = %Error::NameCollision(identity), "cannot hydrate component");
            return None;
        }

        let proxy = Proxy::new(
            identity.clone(),
            InstanceKind::Component,
            Some(el),
            definition.instantiate(),
            self.downgrade(),
        );
        self.inner.instances.insert(identity.clone(), proxy.clone());
        self.inner.components.write().insert(el, proxy.clone());
        debug!(name, instance = %identity, element = %el, "component hydrated");
        Some(proxy)
    }

    fn generate_ref(&self, name: &str) -> String {
        loop {
            let candidate = format!("{name}{}", self.next_ref());
            if !self.inner.instances.contains_key(&candidate) && !self.inner.stores.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub(crate) fn register_item(&self, el: NodeId, proxy: Proxy, collection: ItemCollection) {
        self.inner.items.write().insert(el, (proxy, collection));
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub(crate) fn process_records(&self, records: Vec<MutationRecord>) {
        let document = self.document();
        let mut added = Vec::new();
        let mut removed = Vec::new();
        for record in records {
            added.extend(record.added);
            removed.extend(record.removed);
        }

        for node in added {
            if document.is_connected(node) && document.is_element(node) {
                let created = self.hydrate(node);
                for proxy in &created {
                    proxy.run_hook("init");
                }
            }
            let item = self.item_at(node).map(|(proxy, _)| proxy);
            self.inner.pending.resolve_hydration(node, item);
        }

        for node in removed {
            if !document.is_connected(node) {
                self.teardown(node);
            }
            self.inner.pending.resolve_teardown(node);
        }
    }

    /// Destroy every instance and binding in the detached subtree at `root`.
    fn teardown(&self, root: NodeId) {
        let document = self.document();
        let nodes = document.descendants(root);
        let gone: HashSet<NodeId> = nodes.iter().copied().collect();

        for node in &nodes {
            let component = self.inner.components.write().shift_remove(node);
            if let Some(proxy) = component {
                proxy.run_hook("destroy");
                self.inner
                    .instances
                    .remove_if(proxy.name(), |_, live| live.ptr_eq(&proxy));
                proxy.dispose();
                debug!(instance = %proxy.name(), element = %node, "component destroyed");
            }

            let item = self.inner.items.write().remove(node);
            if let Some((proxy, collection)) = item {
                proxy.run_hook("destroy");
                collection.splice_out(&proxy);
                proxy.dispose();
            }
        }

        // Surviving instances may still hold reactions on removed elements.
        let mut survivors: Vec<Proxy> = self.inner.stores.iter().map(|e| e.value().clone()).collect();
        survivors.extend(self.inner.components.read().values().cloned());
        survivors.extend(self.inner.items.read().values().map(|(p, _)| p.clone()));
        for proxy in survivors {
            proxy.retain_reactions(|r| !gone.contains(&r.element()));
        }

        document.remove_listeners_within(&gone);
        self.inner.bound.lock().retain(|(node, _)| !gone.contains(node));
        self.inner.transitions.lock().retain(|node, _| !gone.contains(node));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::value::Value;
    use std::sync::atomic::AtomicI32;
    use std::sync::Arc;

    fn counter(
        calls: &Arc<AtomicI32>,
    ) -> impl Fn(&crate::value::CallContext<'_>, &[Value]) -> crate::error::Result<Value> + Send + Sync + 'static
    {
        let calls = calls.clone();
        move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Undefined)
        }
    }

    #[test]
    fn start_runs_store_inits_before_component_inits() {
        let rt = Runtime::new(Document::parse(r#"<div mx-data="app"></div>"#));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let o = order.clone();
        rt.component(
            "app",
            Record::new().method("init", move |_, _| {
                o.lock().push("component");
                Ok(Value::Undefined)
            }),
        )
        .unwrap();
        let o = order.clone();
        rt.store(
            "store",
            Record::new().method("init", move |_, _| {
                o.lock().push("store");
                Ok(Value::Undefined)
            }),
        )
        .unwrap();

        rt.start();
        rt.start();
        assert_eq!(*order.lock(), vec!["store", "component"]);
    }

    #[test]
    fn factories_get_references() {
        let rt = Runtime::new(Document::parse(
            r#"<div mx-data="card()" mx-ref="first"></div><div mx-data="card()"></div>"#,
        ));
        rt.component("card", Definition::factory(|| Record::new().with("open", false)))
            .unwrap();
        rt.start();

        let first = rt.instance("first").expect("explicit reference");
        let names = rt.instance_names();
        assert_eq!(names.len(), 2);
        let generated = names.iter().find(|n| n.as_str() != "first").unwrap();
        assert!(generated.starts_with("card"));

        // Each instance owns its own record.
        first.set("open", true);
        assert_eq!(rt.instance(generated).unwrap().get("open"), Value::from(false));
    }

    #[test]
    fn unknown_components_are_skipped() {
        let rt = Runtime::new(Document::parse(r#"<div mx-data="ghost"><span :text="x"></span></div>"#));
        rt.start();
        assert!(rt.instance("ghost").is_none());
    }

    #[test]
    fn removal_destroys_and_readding_rehydrates() {
        let doc = Document::parse(r#"<main><section mx-data="panel"><b :text="n">1</b></section></main>"#);
        let rt = Runtime::new(doc.clone());
        let inits = Arc::new(AtomicI32::new(0));
        let destroys = Arc::new(AtomicI32::new(0));
        rt.component(
            "panel",
            Record::new()
                .with("n", 0)
                .method("init", counter(&inits))
                .method("destroy", counter(&destroys)),
        )
        .unwrap();
        rt.start();

        let main = doc.query_selector(doc.root(), "main").unwrap();
        let section = doc.query_selector(doc.root(), "section").unwrap();
        let first = rt.instance("panel").unwrap();

        doc.remove(section);
        rt.flush();
        assert_eq!(destroys.load(Ordering::SeqCst), 1);
        assert!(rt.instance("panel").is_none());
        assert!(first.is_disposed());

        doc.append_child(main, section);
        rt.flush();
        assert_eq!(inits.load(Ordering::SeqCst), 2);
        let second = rt.instance("panel").unwrap();
        assert!(!second.ptr_eq(&first));
        assert_eq!(second.reaction_count("n"), 1);
    }

    #[test]
    fn moves_are_not_teardowns() {
        let doc = Document::parse(r#"<main><section mx-data="panel"></section></main><aside></aside>"#);
        let rt = Runtime::new(doc.clone());
        let destroys = Arc::new(AtomicI32::new(0));
        rt.component("panel", Record::new().method("destroy", counter(&destroys)))
            .unwrap();
        rt.start();

        let section = doc.query_selector(doc.root(), "section").unwrap();
        let aside = doc.query_selector(doc.root(), "aside").unwrap();
        let before = rt.instance("panel").unwrap();
        doc.append_child(aside, section);
        rt.flush();

        assert_eq!(destroys.load(Ordering::SeqCst), 0);
        assert!(rt.instance("panel").unwrap().ptr_eq(&before));
    }

    #[test]
    fn reset_forgets_everything() {
        let rt = Runtime::new(Document::parse(r#"<div mx-data="app"></div>"#));
        rt.component("app", Record::new()).unwrap();
        rt.start();
        assert!(rt.instance("app").is_some());

        rt.reset();
        assert!(!rt.is_started());
        assert!(rt.instance("app").is_none());
        assert!(!rt.document().is_observing());
        rt.component("app", Record::new()).unwrap();
    }
}
