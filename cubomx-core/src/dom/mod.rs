//! Headless Document
//!
//! An in-memory element tree standing in for the browser DOM. It provides
//! exactly the surface the reactive runtime touches:
//!
//! - elements with ordered attributes, text and comment nodes
//! - live form properties (`value`, `checked`) that diverge from their
//!   attributes once written, like the real DOM
//! - `<template>` content held in a detached fragment
//! - inline style manipulation (`display`, `transition-duration`)
//! - event listeners with bubbling (see [`event`])
//! - a queue of [`MutationRecord`]s, the equivalent of a `MutationObserver`
//!   watching the whole document subtree
//!
//! # Node Storage
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Removing a node
//! detaches it but never frees it, so ids held by reactions or pending
//! operations stay valid; they simply stop being connected.
//!
//! # Mutation Records
//!
//! Child-list changes are recorded only while observing and only when the
//! affected parent is connected to the document root. Work on detached trees
//! (stamping a clone before insertion, building a fragment) is invisible to
//! the observer until the subtree is inserted.

mod event;
mod html;
mod selector;

pub use event::{Event, EventTarget, Handler, ListenerId};
pub use selector::Selector;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use event::Listener;

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the raw arena index.
    pub fn raw(&self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One child-list change delivered to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// The parent whose children changed.
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) struct ElementData {
    pub(crate) tag: String,
    pub(crate) attrs: IndexMap<String, String>,
    /// Live `value` property once it diverged from the attribute.
    pub(crate) value: Option<String>,
    /// Live `checked` property once it diverged from the attribute.
    pub(crate) checked: Option<bool>,
    /// Content fragment of a `<template>`.
    pub(crate) content: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Document,
    Fragment,
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
}

/// The arena. Every public operation on [`Document`] takes the lock once.
#[derive(Debug)]
pub(crate) struct Tree {
    pub(crate) nodes: Vec<NodeData>,
}

const ROOT: NodeId = NodeId(0);

impl Tree {
    fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
        }
    }

    pub(crate) fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    pub(crate) fn alloc_element(&mut self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let content = if tag == "template" {
            Some(self.alloc(NodeKind::Fragment))
        } else {
            None
        };
        self.alloc(NodeKind::Element(ElementData {
            tag,
            attrs: IndexMap::new(),
            value: None,
            checked: None,
            content,
        }))
    }

    fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0)
    }

    pub(crate) fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.get(id)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == ROOT {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Is `node` equal to or inside `ancestor`?
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in self.children(node).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.parent(child)?;
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = None;
        }
        Some(parent)
    }

    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        let Some(p) = self.get_mut(parent) else {
            return;
        };
        let index = before
            .and_then(|r| p.children.iter().position(|c| *c == r))
            .unwrap_or(p.children.len());
        p.children.insert(index, child);
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
    }

    fn text_content(&self, id: NodeId) -> String {
        match self.get(id).map(|n| &n.kind) {
            Some(NodeKind::Text(text)) => text.clone(),
            Some(NodeKind::Comment(_)) | None => String::new(),
            Some(_) => {
                let mut out = String::new();
                for node in self.descendants(id) {
                    if let Some(NodeData {
                        kind: NodeKind::Text(text),
                        ..
                    }) = self.get(node)
                    {
                        out.push_str(text);
                    }
                }
                out
            }
        }
    }

    fn clone_subtree(&mut self, id: NodeId, deep: bool) -> NodeId {
        let kind = match self.get(id) {
            Some(node) => node.kind.clone(),
            None => return self.alloc(NodeKind::Fragment),
        };
        let copy = match kind {
            NodeKind::Element(mut data) => {
                let content = data.content;
                data.content = None;
                let copy = self.alloc(NodeKind::Element(data));
                if let Some(content) = content {
                    let fragment = self.clone_subtree(content, true);
                    if let Some(el) = self.element_mut(copy) {
                        el.content = Some(fragment);
                    }
                }
                copy
            }
            other => self.alloc(other),
        };
        if deep {
            let children = self.children(id).to_vec();
            for child in children {
                let child_copy = self.clone_subtree(child, true);
                self.attach(copy, child_copy, None);
            }
        }
        copy
    }
}

struct DocumentInner {
    tree: RwLock<Tree>,
    records: Mutex<Vec<MutationRecord>>,
    observing: AtomicBool,
    listeners: RwLock<Vec<Listener>>,
    next_listener: AtomicU64,
    title: RwLock<String>,
    location: RwLock<String>,
}

/// A shared handle to an in-memory document.
///
/// Cloning the handle shares the underlying tree.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.inner.tree.read().nodes.len())
            .field("observing", &self.is_observing())
            .finish()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                tree: RwLock::new(Tree::new()),
                records: Mutex::new(Vec::new()),
                observing: AtomicBool::new(false),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                title: RwLock::new(String::new()),
                location: RwLock::new(String::from("/")),
            }),
        }
    }

    /// Create a document whose root holds the parsed markup.
    pub fn parse(html: &str) -> Self {
        let document = Self::new();
        {
            let mut tree = document.inner.tree.write();
            html::parse_into(&mut tree, ROOT, html);
        }
        if let Some(title) = document.query_selector(document.root(), "title") {
            *document.inner.title.write() = document.text_content(title);
        }
        document
    }

    /// Do two handles share a tree?
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The document root node.
    pub fn root(&self) -> NodeId {
        ROOT
    }

    // ------------------------------------------------------------------
    // Mutation observation
    // ------------------------------------------------------------------

    /// Start or stop recording child-list mutations.
    pub fn observe(&self, enabled: bool) {
        self.inner.observing.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.inner.records.lock().clear();
        }
    }

    pub fn is_observing(&self) -> bool {
        self.inner.observing.load(Ordering::SeqCst)
    }

    /// Drain the records collected since the last call.
    pub fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.inner.records.lock())
    }

    pub fn has_pending_records(&self) -> bool {
        !self.inner.records.lock().is_empty()
    }

    fn record(&self, records: Vec<MutationRecord>) {
        if records.is_empty() || !self.is_observing() {
            return;
        }
        self.inner.records.lock().extend(records);
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner.tree.write().alloc_element(tag)
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.inner.tree.write().alloc(NodeKind::Text(text.to_string()))
    }

    /// Parse markup into detached nodes. Returns the top-level nodes.
    pub fn parse_fragment(&self, html: &str) -> Vec<NodeId> {
        let mut tree = self.inner.tree.write();
        let fragment = tree.alloc(NodeKind::Fragment);
        html::parse_into(&mut tree, fragment, html);
        let roots = tree.children(fragment).to_vec();
        for root in &roots {
            tree.detach(*root);
        }
        roots
    }

    /// Copy a node, and its subtree when `deep`. The copy is detached.
    pub fn clone_node(&self, node: NodeId, deep: bool) -> NodeId {
        self.inner.tree.write().clone_subtree(node, deep)
    }

    // ------------------------------------------------------------------
    // Tree structure
    // ------------------------------------------------------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.read().parent(node)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.tree.read().children(node).to_vec()
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        let tree = self.inner.tree.read();
        tree.children(node)
            .iter()
            .copied()
            .filter(|c| tree.element(*c).is_some())
            .collect()
    }

    pub fn first_element_child(&self, node: NodeId) -> Option<NodeId> {
        self.element_children(node).into_iter().next()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let tree = self.inner.tree.read();
        let parent = tree.parent(node)?;
        let siblings = tree.children(parent);
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }

    /// The node and everything below it, in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.tree.read().descendants(node)
    }

    /// Elements in the subtree rooted at `node` (inclusive), in document order.
    pub fn elements_within(&self, node: NodeId) -> Vec<NodeId> {
        let tree = self.inner.tree.read();
        tree.descendants(node)
            .into_iter()
            .filter(|n| tree.element(*n).is_some())
            .collect()
    }

    /// Ancestors from `node` upwards, `node` included.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let tree = self.inner.tree.read();
        let mut out = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            out.push(id);
            current = tree.parent(id);
        }
        out
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.inner.tree.read().is_connected(node)
    }

    /// Is `node` equal to or inside `ancestor`?
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inner.tree.read().contains(ancestor, node)
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.inner.tree.read().element(node).is_some()
    }

    /// Lowercase tag name, `None` for non-elements.
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.inner.tree.read().element(node).map(|e| e.tag.clone())
    }

    /// Content fragment of a `<template>` element.
    pub fn template_content(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.read().element(node).and_then(|e| e.content)
    }

    /// Insert `child` into `parent` before `reference` (or at the end).
    ///
    /// A child that already has a parent is moved.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let mut records = Vec::new();
        {
            let mut tree = self.inner.tree.write();
            if tree.contains(child, parent) {
                tracing::warn!(%parent, %child, "refusing to insert a node into its own subtree");
                return;
            }
            if let Some(old_parent) = tree.parent(child) {
                let was_connected = tree.is_connected(old_parent);
                tree.detach(child);
                if was_connected {
                    records.push(MutationRecord {
                        target: old_parent,
                        added: Vec::new(),
                        removed: vec![child],
                    });
                }
            }
            // A fragment inserts its children, not itself.
            let moved = match tree.get(child).map(|n| &n.kind) {
                Some(NodeKind::Fragment) => {
                    let children = tree.children(child).to_vec();
                    for c in &children {
                        tree.detach(*c);
                    }
                    children
                }
                _ => vec![child],
            };
            for node in &moved {
                tree.attach(parent, *node, reference);
            }
            if tree.is_connected(parent) && !moved.is_empty() {
                records.push(MutationRecord {
                    target: parent,
                    added: moved,
                    removed: Vec::new(),
                });
            }
        }
        self.record(records);
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Detach a node from its parent.
    pub fn remove(&self, node: NodeId) {
        let mut records = Vec::new();
        {
            let mut tree = self.inner.tree.write();
            let connected = tree.is_connected(node);
            if let Some(parent) = tree.detach(node) {
                if connected {
                    records.push(MutationRecord {
                        target: parent,
                        added: Vec::new(),
                        removed: vec![node],
                    });
                }
            }
        }
        self.record(records);
    }

    fn replace_children(&self, node: NodeId, build: impl FnOnce(&mut Tree, NodeId)) {
        let mut records = Vec::new();
        {
            let mut tree = self.inner.tree.write();
            let connected = tree.is_connected(node);
            let removed = tree.children(node).to_vec();
            for child in &removed {
                tree.detach(*child);
            }
            build(&mut tree, node);
            let added = tree.children(node).to_vec();
            if connected && (!removed.is_empty() || !added.is_empty()) {
                records.push(MutationRecord {
                    target: node,
                    added,
                    removed,
                });
            }
        }
        self.record(records);
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    pub fn text_content(&self, node: NodeId) -> String {
        self.inner.tree.read().text_content(node)
    }

    pub fn set_text_content(&self, node: NodeId, text: &str) {
        let is_text = matches!(
            self.inner.tree.read().get(node).map(|n| &n.kind),
            Some(NodeKind::Text(_))
        );
        if is_text {
            if let Some(n) = self.inner.tree.write().get_mut(node) {
                n.kind = NodeKind::Text(text.to_string());
            }
            return;
        }
        self.replace_children(node, |tree, node| {
            if !text.is_empty() {
                let text = tree.alloc(NodeKind::Text(text.to_string()));
                tree.attach(node, text, None);
            }
        });
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let tree = self.inner.tree.read();
        let mut out = String::new();
        let source = tree.element(node).and_then(|e| e.content).unwrap_or(node);
        for child in tree.children(source) {
            html::serialize(&tree, *child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let tree = self.inner.tree.read();
        let mut out = String::new();
        html::serialize(&tree, node, &mut out);
        out
    }

    pub fn set_inner_html(&self, node: NodeId, markup: &str) {
        self.replace_children(node, |tree, node| html::parse_into(tree, node, markup));
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .tree
            .read()
            .element(node)
            .and_then(|e| e.attrs.get(name).cloned())
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.inner
            .tree
            .read()
            .element(node)
            .map(|e| e.attrs.contains_key(name))
            .unwrap_or(false)
    }

    /// All attributes in source order.
    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.inner
            .tree
            .read()
            .element(node)
            .map(|e| {
                e.attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.inner.tree.write().element_mut(node) {
            el.attrs.insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(el) = self.inner.tree.write().element_mut(node) {
            el.attrs.shift_remove(name);
        }
    }

    // ------------------------------------------------------------------
    // Live form properties
    // ------------------------------------------------------------------

    /// Is this element a form control with a live `value`/`checked`?
    pub fn is_form_control(&self, node: NodeId) -> bool {
        matches!(
            self.tag_name(node).as_deref(),
            Some("input" | "textarea" | "select")
        )
    }

    /// The live `value` property.
    pub fn value(&self, node: NodeId) -> String {
        let tree = self.inner.tree.read();
        let Some(el) = tree.element(node) else {
            return String::new();
        };
        if let Some(value) = &el.value {
            return value.clone();
        }
        match el.tag.as_str() {
            "textarea" => tree.text_content(node),
            "select" => {
                let options: Vec<NodeId> = tree
                    .descendants(node)
                    .into_iter()
                    .filter(|n| tree.element(*n).map(|e| e.tag == "option").unwrap_or(false))
                    .collect();
                let chosen = options
                    .iter()
                    .find(|o| {
                        tree.element(**o)
                            .map(|e| e.attrs.contains_key("selected"))
                            .unwrap_or(false)
                    })
                    .or(options.first());
                chosen
                    .map(|o| {
                        tree.element(*o)
                            .and_then(|e| e.attrs.get("value").cloned())
                            .unwrap_or_else(|| tree.text_content(*o))
                    })
                    .unwrap_or_default()
            }
            _ => el.attrs.get("value").cloned().unwrap_or_default(),
        }
    }

    pub fn set_value(&self, node: NodeId, value: &str) {
        if let Some(el) = self.inner.tree.write().element_mut(node) {
            el.value = Some(value.to_string());
        }
    }

    /// The live `checked` property.
    pub fn checked(&self, node: NodeId) -> bool {
        self.inner
            .tree
            .read()
            .element(node)
            .map(|e| e.checked.unwrap_or_else(|| e.attrs.contains_key("checked")))
            .unwrap_or(false)
    }

    pub fn set_checked(&self, node: NodeId, checked: bool) {
        if let Some(el) = self.inner.tree.write().element_mut(node) {
            el.checked = Some(checked);
        }
    }

    // ------------------------------------------------------------------
    // Classes and inline style
    // ------------------------------------------------------------------

    pub fn class_names(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.class_names(node).iter().any(|c| c == class)
    }

    pub fn set_class_name(&self, node: NodeId, classes: &str) {
        if classes.trim().is_empty() {
            self.remove_attribute(node, "class");
        } else {
            self.set_attribute(node, "class", classes.trim());
        }
    }

    pub fn add_class(&self, node: NodeId, class: &str) {
        let mut classes = self.class_names(node);
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
            self.set_class_name(node, &classes.join(" "));
        }
    }

    pub fn remove_class(&self, node: NodeId, class: &str) {
        let mut classes = self.class_names(node);
        let before = classes.len();
        classes.retain(|c| c != class);
        if classes.len() != before {
            self.set_class_name(node, &classes.join(" "));
        }
    }

    fn style_declarations(&self, node: NodeId) -> Vec<(String, String)> {
        self.attribute(node, "style")
            .map(|style| {
                style
                    .split(';')
                    .filter_map(|decl| {
                        let (name, value) = decl.split_once(':')?;
                        let name = name.trim().to_ascii_lowercase();
                        (!name.is_empty()).then(|| (name, value.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read one inline style property.
    pub fn style_property(&self, node: NodeId, name: &str) -> Option<String> {
        self.style_declarations(node)
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Set (`Some`) or clear (`None`) one inline style property.
    pub fn set_style_property(&self, node: NodeId, name: &str, value: Option<&str>) {
        let mut decls = self.style_declarations(node);
        decls.retain(|(n, _)| n != name);
        if let Some(value) = value {
            decls.push((name.to_string(), value.to_string()));
        }
        if decls.is_empty() {
            self.remove_attribute(node, "style");
        } else {
            let style = decls
                .iter()
                .map(|(n, v)| format!("{n}: {v};"))
                .collect::<Vec<_>>()
                .join(" ");
            self.set_attribute(node, "style", &style);
        }
    }

    /// Is the element hidden with an inline `display: none`?
    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.style_property(node, "display").as_deref() == Some("none")
    }

    // ------------------------------------------------------------------
    // Page state
    // ------------------------------------------------------------------

    pub fn title(&self) -> String {
        self.inner.title.read().clone()
    }

    pub fn set_title(&self, title: &str) {
        *self.inner.title.write() = title.to_string();
    }

    pub fn location(&self) -> String {
        self.inner.location.read().clone()
    }

    pub fn set_location(&self, url: &str) {
        *self.inner.location.write() = url.to_string();
    }

    // ------------------------------------------------------------------
    // Selectors
    // ------------------------------------------------------------------

    /// First element below `scope` matching `selector`.
    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        self.query_selector_all(scope, selector).into_iter().next()
    }

    /// Elements below `scope` (exclusive) matching `selector`, in document order.
    /// An unparseable selector matches nothing.
    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Vec<NodeId> {
        let Ok(selector) = Selector::parse(selector) else {
            tracing::warn!(selector, "invalid selector");
            return Vec::new();
        };
        self.select(scope, &selector)
    }

    pub fn select(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let tree = self.inner.tree.read();
        tree.descendants(scope)
            .into_iter()
            .skip(1)
            .filter(|n| selector.matches(&tree, *n))
            .collect()
    }

    /// Does `node` itself match `selector`?
    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches(&self.inner.tree.read(), node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_builds_tree() {
        let doc = Document::parse(r#"<div id="a"><span class="x y">hi</span></div>"#);
        let div = doc.query_selector(doc.root(), "#a").unwrap();
        assert_eq!(doc.tag_name(div).as_deref(), Some("div"));
        let span = doc.first_element_child(div).unwrap();
        assert_eq!(doc.text_content(span), "hi");
        assert_eq!(doc.class_names(span), vec!["x", "y"]);
        assert!(doc.is_connected(span));
    }

    #[test]
    fn mutations_are_recorded_only_while_observing() {
        let doc = Document::parse("<ul></ul>");
        let ul = doc.query_selector(doc.root(), "ul").unwrap();

        let li = doc.create_element("li");
        doc.append_child(ul, li);
        assert!(doc.take_records().is_empty());

        doc.observe(true);
        let li2 = doc.create_element("li");
        doc.append_child(ul, li2);
        doc.remove(li);
        let records = doc.take_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].added, vec![li2]);
        assert_eq!(records[1].removed, vec![li]);
        assert!(!doc.is_connected(li));
    }

    #[test]
    fn detached_work_is_not_recorded() {
        let doc = Document::parse("<div></div>");
        doc.observe(true);
        let outer = doc.create_element("section");
        let inner = doc.create_element("p");
        doc.append_child(outer, inner);
        doc.set_text_content(inner, "x");
        assert!(doc.take_records().is_empty());
    }

    #[test]
    fn live_value_diverges_from_attribute() {
        let doc = Document::parse(r#"<input value="a"><input type="checkbox" checked>"#);
        let inputs = doc.query_selector_all(doc.root(), "input");
        assert_eq!(doc.value(inputs[0]), "a");
        doc.set_value(inputs[0], "b");
        assert_eq!(doc.value(inputs[0]), "b");
        assert_eq!(doc.attribute(inputs[0], "value").as_deref(), Some("a"));

        assert!(doc.checked(inputs[1]));
        doc.set_checked(inputs[1], false);
        assert!(!doc.checked(inputs[1]));
    }

    #[test]
    fn inline_style_round_trips() {
        let doc = Document::parse(r#"<p style="color: red"></p>"#);
        let p = doc.query_selector(doc.root(), "p").unwrap();
        doc.set_style_property(p, "display", Some("none"));
        assert!(doc.is_hidden(p));
        assert_eq!(doc.style_property(p, "color").as_deref(), Some("red"));
        doc.set_style_property(p, "display", None);
        assert!(!doc.is_hidden(p));
    }

    #[test]
    fn template_content_is_detached() {
        let doc = Document::parse(r#"<ul><template><li>x</li></template></ul>"#);
        let template = doc.query_selector(doc.root(), "template").unwrap();
        let content = doc.template_content(template).unwrap();
        let li = doc.first_element_child(content).unwrap();
        assert!(!doc.is_connected(li));
        assert!(doc.query_selector(doc.root(), "li").is_none());
        assert_eq!(doc.inner_html(template), "<li>x</li>");
    }

    #[test]
    fn clone_is_deep_and_detached() {
        let doc = Document::parse(r#"<ul><li a="1"><b>x</b></li></ul>"#);
        let li = doc.query_selector(doc.root(), "li").unwrap();
        let copy = doc.clone_node(li, true);
        assert_ne!(copy, li);
        assert!(!doc.is_connected(copy));
        assert_eq!(doc.outer_html(copy), r#"<li a="1"><b>x</b></li>"#);
    }

    #[test]
    fn inner_html_replaces_children() {
        let doc = Document::parse("<div><p>old</p></div>");
        let div = doc.query_selector(doc.root(), "div").unwrap();
        doc.observe(true);
        doc.set_inner_html(div, "<em>new</em>");
        assert_eq!(doc.inner_html(div), "<em>new</em>");
        let records = doc.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].removed.len(), 1);
        assert_eq!(records[0].added.len(), 1);
    }
}
