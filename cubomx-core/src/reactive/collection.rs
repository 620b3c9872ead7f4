//! Item collections.
//!
//! A collection owns the proxies of the elements marked `mx-item="prop"`
//! under one owner. Its mutating methods only touch the document: they
//! stamp, insert or remove elements and return a [`Completion`]. The item
//! array itself changes when the lifecycle controller processes the
//! resulting mutation records, which is also when the completion resolves.
//!
//! # Indices
//!
//! Positional methods count only items whose element is still attached.
//! Two `delete(0)` calls issued back to back therefore remove the first two
//! items, even though neither removal has been observed yet.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::class_list::class_names_of;
use super::proxy::Proxy;
use crate::directive::bind::BindAttribute;
use crate::dom::NodeId;
use crate::runtime::{Completion, Runtime, WeakRuntime};
use crate::value::{Record, Value};

struct CollectionInner {
    marker: String,
    items: RwLock<Vec<Proxy>>,
    stencil: RwLock<Option<NodeId>>,
    parent: RwLock<Option<NodeId>>,
    runtime: WeakRuntime,
}

/// An ordered list of item proxies kept in step with the document.
#[derive(Clone)]
pub struct ItemCollection {
    inner: Arc<CollectionInner>,
}

impl ItemCollection {
    pub(crate) fn new(marker: &str, runtime: WeakRuntime) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                marker: marker.to_string(),
                items: RwLock::new(Vec::new()),
                stencil: RwLock::new(None),
                parent: RwLock::new(None),
                runtime,
            }),
        }
    }

    /// The `mx-item` value this collection was created for.
    pub fn marker(&self) -> &str {
        &self.inner.marker
    }

    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Proxy> {
        self.inner.items.read().get(index).cloned()
    }

    pub fn items(&self) -> Vec<Proxy> {
        self.inner.items.read().clone()
    }

    pub fn index_of(&self, proxy: &Proxy) -> Option<usize> {
        self.inner.items.read().iter().position(|p| p.ptr_eq(proxy))
    }

    pub fn ptr_eq(&self, other: &ItemCollection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Bookkeeping used by hydration and teardown
    // ------------------------------------------------------------------

    pub(crate) fn splice_in(&self, index: usize, proxy: Proxy) {
        let mut items = self.inner.items.write();
        let index = index.min(items.len());
        items.insert(index, proxy);
    }

    pub(crate) fn splice_out(&self, proxy: &Proxy) -> Option<usize> {
        let mut items = self.inner.items.write();
        let index = items.iter().position(|p| p.ptr_eq(proxy))?;
        items.remove(index);
        Some(index)
    }

    pub(crate) fn set_stencil(&self, stencil: NodeId) {
        *self.inner.stencil.write() = Some(stencil);
    }

    pub(crate) fn has_stencil(&self) -> bool {
        self.inner.stencil.read().is_some()
    }

    pub(crate) fn set_parent(&self, parent: NodeId) {
        *self.inner.parent.write() = Some(parent);
    }

    pub(crate) fn parent(&self) -> Option<NodeId> {
        *self.inner.parent.read()
    }

    pub(crate) fn clear_items(&self) {
        self.inner.items.write().clear();
    }

    /// Items whose element is still in the document.
    fn live_items(&self, runtime: &Runtime) -> Vec<Proxy> {
        let document = runtime.document();
        self.items()
            .into_iter()
            .filter(|p| p.element().map(|el| document.is_connected(el)).unwrap_or(false))
            .collect()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append a new item built from `item`.
    pub fn add(&self, item: Record) -> Completion {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Completion::ready(None);
        };
        let Some(parent) = self.parent() else {
            warn!(collection = %self.marker(), "collection has no parent element");
            return Completion::ready(None);
        };
        self.insert_stamped(&runtime, item, parent, None)
    }

    /// Insert a new item before every other child of the parent.
    pub fn prepend(&self, item: Record) -> Completion {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Completion::ready(None);
        };
        let Some(parent) = self.parent() else {
            warn!(collection = %self.marker(), "collection has no parent element");
            return Completion::ready(None);
        };
        let first = runtime.document().children(parent).first().copied();
        self.insert_stamped(&runtime, item, parent, first)
    }

    /// Insert a new item at `index`. An index equal to the length appends;
    /// anything larger is ignored.
    pub fn insert(&self, item: Record, index: usize) -> Completion {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Completion::ready(None);
        };
        let live = self.live_items(&runtime);
        if index > live.len() {
            warn!(collection = %self.marker(), index, len = live.len(), "insert index out of bounds");
            return Completion::ready(None);
        }
        if index == live.len() {
            return self.add(item);
        }
        let Some(reference) = live[index].element() else {
            return Completion::ready(None);
        };
        let Some(parent) = runtime.document().parent(reference) else {
            return Completion::ready(None);
        };
        self.insert_stamped(&runtime, item, parent, Some(reference))
    }

    /// Remove the item at `index`. Resolves with the removed proxy.
    pub fn delete(&self, index: usize) -> Completion {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Completion::ready(None);
        };
        let live = self.live_items(&runtime);
        match live.get(index) {
            Some(proxy) => self.remove_live(&runtime, proxy),
            None => {
                debug!(collection = %self.marker(), index, "delete index out of bounds");
                Completion::ready(None)
            }
        }
    }

    /// Remove a specific item.
    pub fn remove(&self, proxy: &Proxy) -> Completion {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Completion::ready(None);
        };
        let live = self.live_items(&runtime);
        match live.iter().find(|p| p.ptr_eq(proxy)) {
            Some(proxy) => self.remove_live(&runtime, proxy),
            None => Completion::ready(None),
        }
    }

    /// Remove the last item.
    pub fn pop(&self) -> Completion {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Completion::ready(None);
        };
        match self.live_items(&runtime).last() {
            Some(proxy) => self.remove_live(&runtime, proxy),
            None => Completion::ready(None),
        }
    }

    /// Remove the first item.
    pub fn shift(&self) -> Completion {
        self.delete(0)
    }

    /// Remove every item.
    pub fn clear(&self) -> Completion {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Completion::ready(None);
        };
        let document = runtime.document();
        let mut completion = Completion::new(&runtime);
        for proxy in self.live_items(&runtime) {
            if let Some(el) = proxy.element() {
                completion.push_teardown(runtime.pending().expect_teardown(el));
                document.remove(el);
            }
        }
        completion
    }

    /// Replace the item at `index` with a new one built from `item`.
    /// Resolves with the new proxy.
    pub fn replace(&self, index: usize, item: Record) -> Completion {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Completion::ready(None);
        };
        let live = self.live_items(&runtime);
        let Some(old) = live.get(index).and_then(Proxy::element) else {
            debug!(collection = %self.marker(), index, "replace index out of bounds");
            return Completion::ready(None);
        };
        let document = runtime.document();
        let Some(parent) = document.parent(old) else {
            return Completion::ready(None);
        };
        let Some(clone) = self.stamp(&runtime, &item) else {
            return Completion::ready(None);
        };

        let mut completion = Completion::new(&runtime);
        completion.push_hydration(runtime.pending().expect_hydration(clone, Some(item)));
        completion.push_teardown(runtime.pending().expect_teardown(old));
        document.insert_before(parent, clone, Some(old));
        document.remove(old);
        completion
    }

    fn remove_live(&self, runtime: &Runtime, proxy: &Proxy) -> Completion {
        let Some(el) = proxy.element() else {
            return Completion::ready(None);
        };
        let mut completion = Completion::new(runtime).with_result(proxy.clone());
        completion.push_teardown(runtime.pending().expect_teardown(el));
        runtime.document().remove(el);
        completion
    }

    fn insert_stamped(
        &self,
        runtime: &Runtime,
        item: Record,
        parent: NodeId,
        reference: Option<NodeId>,
    ) -> Completion {
        let Some(clone) = self.stamp(runtime, &item) else {
            return Completion::ready(None);
        };
        let mut completion = Completion::new(runtime);
        completion.push_hydration(runtime.pending().expect_hydration(clone, Some(item)));
        runtime.document().insert_before(parent, clone, reference);
        completion
    }

    // ------------------------------------------------------------------
    // Stamping
    // ------------------------------------------------------------------

    /// Clone the stencil, mark it as an item of this collection and write
    /// the item's fields into its item-scope bindings.
    fn stamp(&self, runtime: &Runtime, item: &Record) -> Option<NodeId> {
        let document = runtime.document();
        let source = *self.inner.stencil.read();
        let Some(source) = source else {
            warn!(collection = %self.marker(), "no stencil to clone");
            return None;
        };

        let clone = document.clone_node(source, true);
        let config = runtime.config();
        document.set_attribute(clone, &config.markers.item, self.marker());

        for el in document.elements_within(clone) {
            for (name, raw) in document.attributes(el) {
                let Some(bind) = BindAttribute::parse(&name, &raw, &config.prefixes) else {
                    continue;
                };
                if !bind.is_item_scope() {
                    continue;
                }
                let Some(value) = item.get(bind.path()) else {
                    continue;
                };
                write_field(runtime, el, bind.target(), value);
            }
        }
        Some(clone)
    }
}

fn write_field(runtime: &Runtime, el: NodeId, target: &str, value: &Value) {
    let document = runtime.document();
    match target {
        "text" => document.set_text_content(el, &value.to_display_string()),
        "html" => document.set_inner_html(el, &value.to_display_string()),
        "value" => {
            let text = value.to_display_string();
            document.set_attribute(el, "value", &text);
            document.set_value(el, &text);
        }
        "checked" => {
            if value.is_truthy() {
                document.set_attribute(el, "checked", "");
            } else {
                document.remove_attribute(el, "checked");
            }
            document.set_checked(el, value.is_truthy());
        }
        "class" => {
            let names = class_names_of(value).unwrap_or_default();
            document.set_class_name(el, &names.join(" "));
        }
        other => document.set_attribute(el, other, &value.to_display_string()),
    }
}

impl std::fmt::Debug for ItemCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemCollection")
            .field("marker", &self.inner.marker)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::reactive::InstanceKind;

    fn page(html: &str) -> (Runtime, Proxy) {
        let rt = Runtime::new(Document::parse(html));
        rt.component("list", Record::new()).unwrap();
        rt.start();
        let proxy = rt.instance("list").unwrap();
        (rt, proxy)
    }

    fn collection(proxy: &Proxy) -> ItemCollection {
        proxy.get("items").as_collection().cloned().expect("collection")
    }

    #[test]
    fn hydration_collects_existing_items() {
        let (_rt, list) = page(
            r#"<ul mx-data="list"><li mx-item="items" ::text="name">A</li><li mx-item="items" ::text="name">B</li></ul>"#,
        );
        let items = collection(&list);
        assert_eq!(items.len(), 2);
        assert_eq!(items.get(1).unwrap().get("name"), Value::from("B"));
        assert_eq!(items.get(0).unwrap().kind(), InstanceKind::Item);
    }

    #[tokio::test]
    async fn add_stamps_from_the_template() {
        let (rt, list) = page(
            r#"<ul mx-data="list"><template mx-item="items"><li ::text="name" ::class="cls"></li></template></ul>"#,
        );
        let items = collection(&list);
        assert!(items.is_empty());

        let proxy = items
            .add(Record::new().with("name", "X").with("cls", "a b"))
            .await
            .expect("new item");
        assert_eq!(items.len(), 1);
        assert_eq!(proxy.get("name"), Value::from("X"));

        let el = proxy.element().unwrap();
        let doc = rt.document();
        assert_eq!(doc.text_content(el), "X");
        assert_eq!(doc.class_names(el), vec!["a", "b"]);
        assert!(doc.query_selector(doc.root(), "template").is_none());
    }

    #[tokio::test]
    async fn back_to_back_deletes_remove_distinct_items() {
        let (_rt, list) = page(
            r#"<ul mx-data="list"><li mx-item="items" ::text="n">1</li><li mx-item="items" ::text="n">2</li><li mx-item="items" ::text="n">3</li></ul>"#,
        );
        let items = collection(&list);
        let first = items.delete(0);
        let second = items.delete(0);

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        assert_eq!(a.get("n"), Value::from(1));
        assert_eq!(b.get("n"), Value::from(2));
        assert_eq!(items.len(), 1);
        assert_eq!(items.get(0).unwrap().get("n"), Value::from(3));
    }

    #[tokio::test]
    async fn insert_and_replace_keep_order() {
        let (_rt, list) = page(
            r#"<ul mx-data="list"><li mx-item="items" ::text="n">1</li><li mx-item="items" ::text="n">3</li></ul>"#,
        );
        let items = collection(&list);
        items.insert(Record::new().with("n", 2), 1).await;
        let names: Vec<Value> = items.items().iter().map(|p| p.get("n")).collect();
        assert_eq!(names, vec![Value::from(1), Value::from(2), Value::from(3)]);

        let replaced = items.replace(0, Record::new().with("n", 0)).await.unwrap();
        assert_eq!(replaced.get("n"), Value::from(0));
        assert_eq!(items.len(), 3);
        assert!(items.get(0).unwrap().ptr_eq(&replaced));

        assert!(items.insert(Record::new(), 10).await.is_none());
        assert!(items.delete(10).await.is_none());
    }

    #[tokio::test]
    async fn prepend_pop_shift_clear() {
        let (_rt, list) = page(
            r#"<ul mx-data="list"><li mx-item="items" ::text="n">2</li></ul>"#,
        );
        let items = collection(&list);
        items.prepend(Record::new().with("n", 1)).await;
        items.add(Record::new().with("n", 3)).await;
        assert_eq!(items.get(0).unwrap().get("n"), Value::from(1));

        assert_eq!(items.pop().await.unwrap().get("n"), Value::from(3));
        assert_eq!(items.shift().await.unwrap().get("n"), Value::from(1));
        assert_eq!(items.len(), 1);

        items.clear().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn add_after_clear_without_template() {
        let (rt, list) = page(
            r#"<ul mx-data="list"><li mx-item="items" ::text="name">A</li></ul>"#,
        );
        let items = collection(&list);
        items.get(0).unwrap().set("name", "changed");

        items.clear().await;
        assert!(items.is_empty());

        let added = items
            .add(Record::new().with("name", "X"))
            .await
            .expect("stamped from the first item");
        assert_eq!(items.len(), 1);
        let doc = rt.document();
        let el = added.element().unwrap();
        assert!(doc.is_connected(el));
        assert_eq!(doc.text_content(el), "X");

        // Fields missing from the record come from the first item as hydrated.
        let bare = items.add(Record::new()).await.unwrap();
        assert_eq!(bare.get("name"), Value::from("A"));
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn delete_first_of_two_shifts_the_second_down() {
        let (_rt, list) = page(
            r#"<ul mx-data="list"><li mx-item="items" ::text="n">1</li><li mx-item="items" ::text="n">2</li></ul>"#,
        );
        let items = collection(&list);
        let second = items.get(1).unwrap();

        items.delete(0).await;
        assert_eq!(items.len(), 1);
        assert!(items.get(0).unwrap().ptr_eq(&second));
        assert_eq!(items.get(0).unwrap().get("n"), Value::from(2));
    }

    #[tokio::test]
    async fn remove_by_identity() {
        let (rt, list) = page(
            r#"<ul mx-data="list"><li mx-item="items" ::text="n">1</li><li mx-item="items" ::text="n">2</li><li mx-item="items" ::text="n">3</li></ul>"#,
        );
        let items = collection(&list);
        let middle = items.get(1).unwrap();
        let el = middle.element().unwrap();

        let removed = items.remove(&middle).await.expect("removed proxy");
        assert!(removed.ptr_eq(&middle));
        assert!(middle.is_disposed());
        assert!(!rt.document().is_connected(el));
        let left: Vec<Value> = items.items().iter().map(|p| p.get("n")).collect();
        assert_eq!(left, vec![Value::from(1), Value::from(3)]);

        assert!(items.remove(&middle).await.is_none());
    }
}
