//! Event bindings: `@event.mod="expr"` and `mx-on:event.mod="expr"`.
//!
//! The expression is parsed once when the element is bound. Each run
//! evaluates it with the nearest component as `this`, the nearest item as
//! `$item`, the element as `$el` and the event as `$event`.
//!
//! Modifiers:
//!
//! - `prevent` calls `preventDefault` before the expression runs.
//! - `stop` calls `stopPropagation` before the expression runs.
//! - `outside` listens on the document and fires only for events whose
//!   target lies outside the element.
//! - `appear` runs the expression once, at the next checkpoint, instead of
//!   listening. `@appear="..."` is the same thing.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{error, trace, warn};

use crate::config::Prefixes;
use crate::dom::{Event, EventTarget, NodeId};
use crate::expr::{self, Program};
use crate::runtime::{Directive, Runtime, WeakRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Modifier {
    Prevent,
    Stop,
    Outside,
    Appear,
}

impl Modifier {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "prevent" => Some(Modifier::Prevent),
            "stop" => Some(Modifier::Stop),
            "outside" => Some(Modifier::Outside),
            "appear" => Some(Modifier::Appear),
            _ => None,
        }
    }
}

/// A parsed event attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EventAttribute {
    kind: String,
    modifiers: SmallVec<[Modifier; 4]>,
}

impl EventAttribute {
    pub(crate) fn parse(name: &str, prefixes: &Prefixes) -> Option<Self> {
        let rest = [prefixes.event_word.as_str(), prefixes.event.as_str()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .find_map(|prefix| name.strip_prefix(prefix))?;

        let mut parts = rest.split('.');
        let kind = parts.next().filter(|k| !k.is_empty())?.to_string();
        let mut modifiers = SmallVec::new();
        for raw in parts {
            match Modifier::parse(raw) {
                Some(modifier) => modifiers.push(modifier),
                None => warn!(attribute = name, modifier = raw, "unknown event modifier"),
            }
        }
        Some(Self { kind, modifiers })
    }

    fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    fn runs_on_appear(&self) -> bool {
        self.kind == "appear" || self.has(Modifier::Appear)
    }
}

pub(crate) fn resolve(runtime: &Runtime, el: NodeId) {
    let document = runtime.document();
    let prefixes = &runtime.config().prefixes;
    let events: Vec<(String, EventAttribute, String)> = document
        .attributes(el)
        .into_iter()
        .filter_map(|(name, value)| {
            EventAttribute::parse(&name, prefixes).map(|attr| (name, attr, value))
        })
        .collect();
    if events.is_empty() || !runtime.mark(el, Directive::Event) {
        return;
    }

    for (name, attr, source) in events {
        let program = match expr::parse(&source) {
            Ok(program) => Arc::new(program),
            Err(err) => {
                error!(element = %el, attribute = %name, error = %err, "event binding skipped");
                continue;
            }
        };
        let handler = Handler {
            runtime: runtime.downgrade(),
            el,
            program,
        };

        if attr.runs_on_appear() {
            runtime
                .scheduler()
                .queue_microtask(Box::new(move || handler.run(None)));
        } else if attr.has(Modifier::Outside) {
            let prevent = attr.has(Modifier::Prevent);
            document.add_listener(EventTarget::Document, &attr.kind, Some(el), move |event| {
                let inside = event
                    .target()
                    .zip(handler.runtime.upgrade())
                    .map(|(target, rt)| rt.document().contains(el, target))
                    .unwrap_or(false);
                if inside {
                    return;
                }
                if prevent {
                    event.prevent_default();
                }
                handler.run(Some(event));
            });
        } else {
            let (prevent, stop) = (attr.has(Modifier::Prevent), attr.has(Modifier::Stop));
            document.add_listener(EventTarget::Node(el), &attr.kind, Some(el), move |event| {
                if prevent {
                    event.prevent_default();
                }
                if stop {
                    event.stop_propagation();
                }
                handler.run(Some(event));
            });
        }
        trace!(element = %el, attribute = %name, "event bound");
    }
}

struct Handler {
    runtime: WeakRuntime,
    el: NodeId,
    program: Arc<Program>,
}

impl Handler {
    fn run(&self, event: Option<&Event>) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let scope = expr::Scope {
            this: runtime.owner_of(self.el),
            item: runtime.item_of(self.el),
            element: Some(self.el),
            event: event.cloned(),
            runtime,
        };
        if let Err(err) = expr::evaluate(&self.program, &scope) {
            error!(element = %self.el, expression = %self.program.source(), error = %err, "event handler failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::value::{Record, Value};

    fn page(html: &str) -> (Runtime, Document) {
        let doc = Document::parse(html);
        let rt = Runtime::new(doc.clone());
        rt.component("app", Record::new().with("n", 0)).unwrap();
        rt.start();
        (rt, doc)
    }

    #[test]
    fn parses_names_and_modifiers() {
        let p = Prefixes::default();
        let attr = EventAttribute::parse("@click.prevent.stop", &p).unwrap();
        assert_eq!(attr.kind, "click");
        assert!(attr.has(Modifier::Prevent) && attr.has(Modifier::Stop));

        let attr = EventAttribute::parse("mx-on:submit", &p).unwrap();
        assert_eq!(attr.kind, "submit");
        assert!(attr.modifiers.is_empty());

        assert!(EventAttribute::parse("@", &p).is_none());
        assert!(EventAttribute::parse("onclick", &p).is_none());
    }

    #[test]
    fn click_runs_the_expression() {
        let (rt, doc) = page(r#"<div mx-data="app"><button @click.prevent="n++">+</button></div>"#);
        let button = doc.query_selector(doc.root(), "button").unwrap();
        let event = Event::new("click");
        rt.dispatch(button, &event);
        rt.dispatch(button, &Event::new("click"));
        assert_eq!(rt.instance("app").unwrap().get("n"), Value::from(2));
        assert!(event.default_prevented());
    }

    #[test]
    fn outside_ignores_inside_clicks() {
        let (rt, doc) = page(
            r#"<div mx-data="app"><div id="menu" @click.outside="n = n + 1"><a>in</a></div></div><p>out</p>"#,
        );
        let inside = doc.query_selector(doc.root(), "a").unwrap();
        let outside = doc.query_selector(doc.root(), "p").unwrap();

        rt.dispatch(inside, &Event::new("click"));
        assert_eq!(rt.instance("app").unwrap().get("n"), Value::from(0));
        rt.dispatch(outside, &Event::new("click"));
        assert_eq!(rt.instance("app").unwrap().get("n"), Value::from(1));
    }

    #[test]
    fn appear_runs_once_after_start() {
        let (rt, doc) = page(r#"<div mx-data="app"><span @appear="n = 10"></span></div>"#);
        assert_eq!(rt.instance("app").unwrap().get("n"), Value::from(10));

        let span = doc.query_selector(doc.root(), "span").unwrap();
        rt.dispatch(span, &Event::new("appear"));
        rt.instance("app").unwrap().set("n", 0);
        rt.flush();
        assert_eq!(rt.instance("app").unwrap().get("n"), Value::from(0));
    }

    #[test]
    fn handlers_see_event_and_element() {
        let (rt, doc) = page(
            r#"<div mx-data="app"><input id="i" value="hi" @input="n = $el.value + $event.type"></div>"#,
        );
        let input = doc.query_selector(doc.root(), "#i").unwrap();
        rt.dispatch(input, &Event::new("input"));
        assert_eq!(rt.instance("app").unwrap().get("n"), Value::from("hiinput"));
    }

    #[test]
    fn stop_keeps_the_event_from_bubbling() {
        let (rt, doc) = page(
            r#"<div mx-data="app" @click="n++"><button id="s" @click.stop="n = n + 10">s</button><button id="b" @click="n = n + 10">b</button></div>"#,
        );
        let stopped = doc.query_selector(doc.root(), "#s").unwrap();
        let bubbling = doc.query_selector(doc.root(), "#b").unwrap();

        let event = Event::new("click");
        rt.dispatch(stopped, &event);
        assert!(event.propagation_stopped());
        assert_eq!(rt.instance("app").unwrap().get("n"), Value::from(10));

        rt.dispatch(bubbling, &Event::new("click"));
        assert_eq!(rt.instance("app").unwrap().get("n"), Value::from(21));
    }

    #[test]
    fn dollar_watch_from_a_handler() {
        let doc = Document::parse(
            r#"<div mx-data="app"><button @click="$watch('n', track)">watch</button></div>"#,
        );
        let rt = Runtime::new(doc.clone());
        rt.component(
            "app",
            Record::new().with("n", 0).method("track", |cx, args| {
                if let Some(this) = cx.this {
                    this.set("last", args.first().cloned().unwrap_or_default());
                    this.set("previous", args.get(1).cloned().unwrap_or_default());
                }
                Ok(Value::Undefined)
            }),
        )
        .unwrap();
        rt.start();

        let app = rt.instance("app").unwrap();
        let button = doc.query_selector(doc.root(), "button").unwrap();
        rt.dispatch(button, &Event::new("click"));
        assert_eq!(app.watcher_count(), 1);

        app.set("n", 4);
        assert_eq!(app.get("last"), Value::from(4));
        assert_eq!(app.get("previous"), Value::from(0));
    }
}
