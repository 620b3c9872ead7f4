//! Property bindings: `:attr="prop"`, `mx-bind:attr="prop"` and their
//! item-scope forms `::attr="prop"`, `mx-item:attr="prop"`.
//!
//! Binding registers a reaction for the property, then seeds the property
//! from what the element currently shows. `value` and `checked` also write
//! user input back to the property.

use tracing::{error, trace};

use super::{resolve_target, Scope};
use crate::config::Prefixes;
use crate::dom::{Document, EventTarget, NodeId};
use crate::error::Result;
use crate::reactive::{Effect, Proxy, Reaction};
use crate::runtime::{Directive, Runtime};
use crate::value::{parse_attribute, Value};

/// A parsed binding attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BindAttribute {
    name: String,
    scope: Scope,
    target: String,
    path: String,
}

impl BindAttribute {
    /// Parse `name="value"` as a binding, or `None` if it is not one.
    pub(crate) fn parse(name: &str, value: &str, prefixes: &Prefixes) -> Option<Self> {
        let mut candidates = [
            (prefixes.item_bind.as_str(), Scope::Item),
            (prefixes.item_bind_word.as_str(), Scope::Item),
            (prefixes.bind_word.as_str(), Scope::Component),
            (prefixes.bind.as_str(), Scope::Component),
        ];
        // Longest prefix first: `::` must win over `:`.
        candidates.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));

        let (target, scope) = candidates.iter().find_map(|(prefix, scope)| {
            if prefix.is_empty() {
                return None;
            }
            name.strip_prefix(prefix).map(|target| (target, *scope))
        })?;
        let path = value.trim();
        if target.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            scope,
            target: target.to_string(),
            path: path.to_string(),
        })
    }

    pub(crate) fn is_item_scope(&self) -> bool {
        self.scope == Scope::Item
    }

    /// The bound aspect of the element: `text`, `html`, `class` or an
    /// attribute name.
    pub(crate) fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }
}

pub(crate) fn resolve(runtime: &Runtime, el: NodeId) {
    let document = runtime.document();
    let prefixes = &runtime.config().prefixes;
    let binds: Vec<BindAttribute> = document
        .attributes(el)
        .iter()
        .filter_map(|(name, value)| BindAttribute::parse(name, value, prefixes))
        .collect();
    if binds.is_empty() || !runtime.mark(el, Directive::Bind) {
        return;
    }

    for bind in &binds {
        if let Err(err) = bind_one(runtime, &document, el, bind) {
            error!(element = %el, attribute = %bind.name, error = %err, "binding skipped");
        }
    }
}

fn bind_one(runtime: &Runtime, document: &Document, el: NodeId, bind: &BindAttribute) -> Result<()> {
    let (proxy, prop) = resolve_target(runtime, el, &bind.path, bind.scope, &bind.name)?;

    // Registered first so a class binding wraps the initial value.
    proxy.add_reaction(&prop, Reaction::new(el, Effect::for_target(&bind.target)));
    proxy.set(&prop, initial_value(document, el, &bind.target));

    match bind.target.as_str() {
        "value" => {
            for kind in ["input", "change"] {
                write_back(runtime, el, kind, &proxy, &prop, |doc, el| Value::from(doc.value(el)));
            }
        }
        "checked" => {
            write_back(runtime, el, "change", &proxy, &prop, |doc, el| {
                Value::Bool(doc.checked(el))
            });
        }
        _ => {}
    }
    trace!(element = %el, instance = %proxy.name(), prop = %prop, target = %bind.target, "bound");
    Ok(())
}

/// What the element currently shows for `target`.
fn initial_value(document: &Document, el: NodeId, target: &str) -> Value {
    match target {
        "text" => parse_attribute(&document.text_content(el)),
        "html" => Value::from(document.inner_html(el)),
        "value" => parse_attribute(&document.value(el)),
        "checked" => Value::Bool(document.checked(el)),
        "class" => Value::array(document.class_names(el).into_iter().map(Value::from).collect()),
        attr => document
            .attribute(el, attr)
            .map(|raw| parse_attribute(&raw))
            .unwrap_or(Value::Null),
    }
}

fn write_back(
    runtime: &Runtime,
    el: NodeId,
    kind: &str,
    proxy: &Proxy,
    prop: &str,
    read: fn(&Document, NodeId) -> Value,
) {
    let weak_runtime = runtime.downgrade();
    let weak_proxy = proxy.downgrade();
    let prop = prop.to_string();
    runtime
        .document()
        .add_listener(EventTarget::Node(el), kind, Some(el), move |_| {
            let (Some(runtime), Some(proxy)) = (weak_runtime.upgrade(), weak_proxy.upgrade()) else {
                return;
            };
            let value = read(&runtime.document(), el);
            Proxy::from_inner(proxy).set(&prop, value);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Event;
    use crate::value::Record;

    fn prefixes() -> Prefixes {
        Prefixes::default()
    }

    #[test]
    fn parses_every_prefix_form() {
        let p = prefixes();
        let b = BindAttribute::parse(":text", "n", &p).unwrap();
        assert_eq!((b.scope, b.target(), b.path()), (Scope::Component, "text", "n"));

        let b = BindAttribute::parse("::text", "name", &p).unwrap();
        assert!(b.is_item_scope());

        let b = BindAttribute::parse("mx-bind:href", " url ", &p).unwrap();
        assert_eq!((b.target(), b.path()), ("href", "url"));

        let b = BindAttribute::parse("mx-item:class", "cls", &p).unwrap();
        assert!(b.is_item_scope());

        assert!(BindAttribute::parse("class", "x", &p).is_none());
        assert!(BindAttribute::parse(":", "x", &p).is_none());
        assert!(BindAttribute::parse(":text", "  ", &p).is_none());
    }

    #[test]
    fn initial_values_come_from_the_element() {
        let doc = Document::parse(
            r#"<div mx-data="app"><span :text="n">41</span><a :href="url" href="/x"></a><i :title="missing"></i></div>"#,
        );
        let rt = Runtime::new(doc);
        rt.component("app", Record::new().with("n", 0)).unwrap();
        rt.start();

        let app = rt.instance("app").unwrap();
        assert_eq!(app.get("n"), Value::from(41));
        assert_eq!(app.get("url"), Value::from("/x"));
        assert_eq!(app.get("missing"), Value::Null);
    }

    #[test]
    fn input_writes_back_raw_strings() {
        let doc = Document::parse(
            r#"<form mx-data="f"><input id="i" :value="name" value="7"><input id="c" type="checkbox" :checked="ok"></form>"#,
        );
        let rt = Runtime::new(doc.clone());
        rt.component("f", Record::new()).unwrap();
        rt.start();
        let f = rt.instance("f").unwrap();
        assert_eq!(f.get("name"), Value::from(7));
        assert_eq!(f.get("ok"), Value::from(false));

        let input = doc.query_selector(doc.root(), "#i").unwrap();
        doc.set_value(input, "42");
        rt.dispatch(input, &Event::new("input"));
        assert_eq!(f.get("name"), Value::from("42"));

        let check = doc.query_selector(doc.root(), "#c").unwrap();
        doc.set_checked(check, true);
        rt.dispatch(check, &Event::new("change"));
        assert_eq!(f.get("ok"), Value::from(true));

        f.set("name", "typed");
        assert_eq!(doc.value(input), "typed");
    }

    #[test]
    fn class_bindings_install_a_class_list() {
        let doc = Document::parse(r#"<div mx-data="app"><p id="p" class="a b" :class="cls"></p></div>"#);
        let rt = Runtime::new(doc.clone());
        rt.component("app", Record::new()).unwrap();
        rt.start();

        let app = rt.instance("app").unwrap();
        let list = app.get("cls").as_class_list().cloned().expect("class list");
        assert_eq!(list.to_vec(), vec!["a", "b"]);

        list.add("c");
        let p = doc.query_selector(doc.root(), "#p").unwrap();
        assert_eq!(doc.class_names(p), vec!["a", "b", "c"]);

        app.set("cls", "z");
        assert_eq!(doc.class_names(p), vec!["z"]);
    }
}
