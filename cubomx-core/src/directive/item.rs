//! List items: `mx-item="prop"` and `mx-item="$name.prop"`.
//!
//! The first element seen for a target creates the owner's
//! [`ItemCollection`] and records its parent. A `<template mx-item>` only
//! contributes its first content element as the stencil and is then removed;
//! without one, a detached copy of the first hydrated item is the stencil.
//! Every other marked element becomes an item proxy, seeded from the record
//! of the pending add that produced it, and is spliced into the collection
//! right after the nearest preceding item of the same collection.

use tracing::{debug, error, warn};

use crate::dom::NodeId;
use crate::error::{Error, Result};
use crate::reactive::{InstanceKind, ItemCollection, Proxy};
use crate::runtime::{Directive, Runtime};
use crate::value::Value;

pub(crate) fn resolve(runtime: &Runtime, el: NodeId) {
    let document = runtime.document();
    let markers = &runtime.config().markers;
    let Some(marker) = document.attribute(el, &markers.item) else {
        return;
    };
    if !runtime.mark(el, Directive::Item) {
        return;
    }
    let marker = marker.trim().to_string();

    let collection = match collection_for(runtime, el, &marker) {
        Ok(collection) => collection,
        Err(err) => {
            error!(element = %el, error = %err, "item skipped");
            return;
        }
    };

    if document.tag_name(el).as_deref() == Some("template") {
        match document
            .template_content(el)
            .and_then(|content| document.first_element_child(content))
        {
            Some(stencil) => collection.set_stencil(stencil),
            None => warn!(element = %el, collection = %marker, "item template has no element"),
        }
        if let Some(parent) = document.parent(el) {
            collection.set_parent(parent);
        }
        document.remove(el);
        debug!(collection = %marker, "item template registered");
        return;
    }

    if collection.parent().is_none() {
        if let Some(parent) = document.parent(el) {
            collection.set_parent(parent);
        }
    }

    if !collection.has_stencil() {
        collection.set_stencil(document.clone_node(el, true));
    }

    let seed = runtime.pending().seed_for(el).unwrap_or_default();
    let proxy = Proxy::new(marker.as_str(), InstanceKind::Item, Some(el), seed, runtime.downgrade());
    let index = insertion_index(runtime, el, &collection);
    runtime.register_item(el, proxy.clone(), collection.clone());
    collection.splice_in(index, proxy);
    debug!(collection = %marker, index, element = %el, "item hydrated");
}

/// The collection named by `marker`, created on first use.
fn collection_for(runtime: &Runtime, el: NodeId, marker: &str) -> Result<ItemCollection> {
    let (owner, prop) = match marker.strip_prefix('$') {
        Some(rest) => {
            let (name, prop) = rest
                .split_once('.')
                .filter(|(name, prop)| !name.is_empty() && !prop.is_empty())
                .ok_or_else(|| Error::MalformedTarget(marker.to_string()))?;
            let owner = runtime
                .instance(name)
                .ok_or_else(|| Error::UnknownInstance(name.to_string()))?;
            (owner, prop.to_string())
        }
        None => {
            let owner = runtime.owner_of(el).ok_or_else(|| Error::NoOwner {
                attribute: runtime.config().markers.item.clone(),
            })?;
            (owner, marker.to_string())
        }
    };
    if prop.is_empty() {
        return Err(Error::MalformedTarget(marker.to_string()));
    }

    if let Value::Collection(collection) = owner.get(&prop) {
        return Ok(collection);
    }
    let collection = ItemCollection::new(marker, runtime.downgrade());
    owner.define(&prop, Value::Collection(collection.clone()));
    Ok(collection)
}

/// Position right after the closest preceding sibling that is an item of
/// the same collection, or the front when there is none.
fn insertion_index(runtime: &Runtime, el: NodeId, collection: &ItemCollection) -> usize {
    let document = runtime.document();
    let Some(parent) = document.parent(el) else {
        return collection.len();
    };
    let siblings = document.children(parent);
    let position = siblings.iter().position(|s| *s == el).unwrap_or(siblings.len());
    siblings[..position]
        .iter()
        .rev()
        .find_map(|sibling| {
            let (proxy, owner) = runtime.item_at(*sibling)?;
            if owner.ptr_eq(collection) {
                collection.index_of(&proxy)
            } else {
                None
            }
        })
        .map(|index| index + 1)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use crate::dom::Document;
    use crate::runtime::Runtime;
    use crate::value::{Record, Value};

    #[test]
    fn store_collections_and_separate_owners() {
        let doc = Document::parse(
            r#"<ul mx-data="a"><li mx-item="rows">1</li></ul>
               <ul mx-data="b"><li mx-item="rows">2</li><li mx-item="rows">3</li></ul>
               <ol><li mx-item="$cart.lines">x</li></ol>"#,
        );
        let rt = Runtime::new(doc);
        rt.component("a", Record::new()).unwrap();
        rt.component("b", Record::new()).unwrap();
        rt.store("cart", Record::new()).unwrap();
        rt.start();

        let len = |name: &str, prop: &str| {
            rt.instance(name)
                .unwrap()
                .get(prop)
                .as_collection()
                .map(|c| c.len())
        };
        assert_eq!(len("a", "rows"), Some(1));
        assert_eq!(len("b", "rows"), Some(2));
        assert_eq!(len("cart", "lines"), Some(1));
    }

    #[test]
    fn orphan_items_are_skipped() {
        let doc = Document::parse(r#"<li mx-item="rows"></li><li mx-item="$ghost.rows"></li>"#);
        let rt = Runtime::new(doc);
        rt.start();
        assert!(rt.instance_names().is_empty());
    }

    #[test]
    fn collections_cannot_be_reassigned() {
        let doc = Document::parse(r#"<ul mx-data="a"><li mx-item="rows">1</li></ul>"#);
        let rt = Runtime::new(doc);
        rt.component("a", Record::new()).unwrap();
        rt.start();

        let a = rt.instance("a").unwrap();
        let before = a.get("rows");
        a.set("rows", Value::array(Vec::new()));
        assert!(a.get("rows").strict_eq(&before));
    }
}
