//! Reaction Implementation
//!
//! A Reaction is the document side of a binding: it copies a property's
//! value into one element whenever the property changes.
//!
//! # How Reactions Apply
//!
//! - `Text` and `Html` replace the element's children.
//!
//! - `Attribute` writes the attribute, except `value` and `checked` on form
//!   controls, which write the live properties so the user's view updates.
//!
//! - `Class` clears the element's class list and re-adds the current names.
//!
//! - `Visibility` shows or hides the element, running its transition when
//!   the change came from a write rather than from the initial binding.

use tracing::trace;

use super::class_list::class_names_of;
use super::transition;
use crate::dom::NodeId;
use crate::runtime::Runtime;
use crate::value::Value;

/// What a reaction does to its element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Text,
    Html,
    Attribute(String),
    Class,
    Visibility { negate: bool },
}

impl Effect {
    /// The effect for a bind target name.
    pub fn for_target(target: &str) -> Self {
        match target {
            "text" => Effect::Text,
            "html" => Effect::Html,
            "class" => Effect::Class,
            other => Effect::Attribute(other.to_string()),
        }
    }
}

/// A property-to-element binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    element: NodeId,
    effect: Effect,
}

impl Reaction {
    pub fn new(element: NodeId, effect: Effect) -> Self {
        Self { element, effect }
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    pub fn effect(&self) -> &Effect {
        &self.effect
    }

    /// Mirror `value` into the element.
    pub(crate) fn apply(&self, runtime: &Runtime, value: &Value, animate: bool) {
        let document = runtime.document();
        let el = self.element;
        if !document.is_element(el) {
            return;
        }
        trace!(element = %el, effect = ?self.effect, "applying reaction");

        match &self.effect {
            Effect::Text => {
                let text = value.to_display_string();
                if document.text_content(el) != text {
                    document.set_text_content(el, &text);
                }
            }
            Effect::Html => {
                let markup = value.to_display_string();
                if document.inner_html(el) != markup {
                    document.set_inner_html(el, &markup);
                }
            }
            Effect::Attribute(name) => match name.as_str() {
                "value" if document.is_form_control(el) => {
                    document.set_value(el, &value.to_display_string());
                }
                "checked" if document.is_form_control(el) => {
                    document.set_checked(el, value.is_truthy());
                }
                _ => document.set_attribute(el, name, &value.to_display_string()),
            },
            Effect::Class => {
                let names = class_names_of(value).unwrap_or_default();
                document.set_class_name(el, &names.join(" "));
            }
            Effect::Visibility { negate } => {
                let visible = value.is_truthy() != *negate;
                transition::apply_visibility(runtime, el, visible, animate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn setup(html: &str) -> (Runtime, NodeId) {
        let document = Document::parse(html);
        let el = document
            .query_selector(document.root(), "#t")
            .expect("target element");
        (Runtime::new(document), el)
    }

    #[test]
    fn effect_for_target_names() {
        assert_eq!(Effect::for_target("text"), Effect::Text);
        assert_eq!(Effect::for_target("class"), Effect::Class);
        assert_eq!(Effect::for_target("href"), Effect::Attribute("href".into()));
    }

    #[test]
    fn text_and_attribute_effects() {
        let (rt, el) = setup(r#"<a id="t">old</a>"#);
        Reaction::new(el, Effect::Text).apply(&rt, &Value::from(5), true);
        assert_eq!(rt.document().text_content(el), "5");

        Reaction::new(el, Effect::Attribute("href".into())).apply(&rt, &Value::from("/x"), true);
        assert_eq!(rt.document().attribute(el, "href").as_deref(), Some("/x"));
    }

    #[test]
    fn value_effect_writes_live_property() {
        let (rt, el) = setup(r#"<input id="t" value="a">"#);
        Reaction::new(el, Effect::Attribute("value".into())).apply(&rt, &Value::from("b"), true);
        assert_eq!(rt.document().value(el), "b");
        assert_eq!(rt.document().attribute(el, "value").as_deref(), Some("a"));
    }

    #[test]
    fn class_effect_replaces_class_names() {
        let (rt, el) = setup(r#"<div id="t" class="x y"></div>"#);
        let value = Value::array(vec!["a".into(), "b".into()]);
        Reaction::new(el, Effect::Class).apply(&rt, &value, true);
        assert_eq!(rt.document().class_names(el), vec!["a", "b"]);
    }

    #[test]
    fn visibility_without_transition_is_immediate() {
        let (rt, el) = setup(r#"<div id="t"></div>"#);
        let reaction = Reaction::new(el, Effect::Visibility { negate: false });
        reaction.apply(&rt, &Value::from(false), true);
        assert!(rt.document().is_hidden(el));
        reaction.apply(&rt, &Value::from(true), true);
        assert!(!rt.document().is_hidden(el));

        let negated = Reaction::new(el, Effect::Visibility { negate: true });
        negated.apply(&rt, &Value::from(true), true);
        assert!(rt.document().is_hidden(el));
    }
}
