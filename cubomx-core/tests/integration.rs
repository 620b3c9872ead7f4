//! Integration Tests for the Runtime
//!
//! These tests drive whole pages: markup in, events and writes through the
//! public API, document state out.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cubomx_core::{
    Config, Document, Event, RawResponse, Record, Runtime, StaticTransport, Strategy, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn page(html: &str) -> (Runtime, Document) {
    init_tracing();
    let doc = Document::parse(html);
    (Runtime::new(doc.clone()), doc)
}

fn text_of(doc: &Document, selector: &str) -> String {
    let node = doc
        .query_selector(doc.root(), selector)
        .unwrap_or_else(|| panic!("no element for {selector}"));
    doc.text_content(node)
}

/// A global write reaches the bound element.
#[test]
fn global_write_updates_text() {
    let (rt, doc) = page(r#"<div mx-data="c"><span :text="n">1</span></div>"#);
    rt.component("c", Record::new()).unwrap();
    rt.start();
    assert_eq!(rt.instance("c").unwrap().get("n"), Value::from(1));

    rt.eval("CuboMX.c.n = 5").unwrap();
    assert_eq!(text_of(&doc, "span"), "5");
    assert_eq!(rt.instance("c").unwrap().get("n"), Value::from(5));
}

/// Writing the current value fires neither reactions nor watchers.
#[test]
fn equal_writes_fire_nothing() {
    let (rt, _doc) = page(r#"<div mx-data="c"><span :text="n">1</span></div>"#);
    rt.component("c", Record::new()).unwrap();
    rt.start();

    let fired = Arc::new(AtomicI32::new(0));
    let counter = fired.clone();
    rt.watch("c.n", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    let c = rt.instance("c").unwrap();
    c.set("n", 1);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    c.set("n", 2);
    c.set("n", 2);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// Typing updates the property; writing the property updates the input.
#[test]
fn input_round_trip() {
    let (rt, doc) = page(r#"<form mx-data="f"><input :value="name" value="a"></form>"#);
    rt.component("f", Record::new()).unwrap();
    rt.start();

    let input = doc.query_selector(doc.root(), "input").unwrap();
    doc.set_value(input, "typed");
    rt.dispatch(input, &Event::new("input"));
    let f = rt.instance("f").unwrap();
    assert_eq!(f.get("name"), Value::from("typed"));

    f.set("name", "written");
    assert_eq!(doc.value(input), "written");
}

/// Adding stamps a new element; deleting the first removes it.
#[tokio::test]
async fn add_then_delete_first() {
    let (rt, doc) = page(
        r#"<ul mx-data="todo"><li mx-item="items" ::text="title">one</li><template mx-item="items"><li ::text="title"></li></template></ul>"#,
    );
    rt.component("todo", Record::new()).unwrap();
    rt.start();

    let todo = rt.instance("todo").unwrap();
    let items = todo.get("items").as_collection().cloned().unwrap();
    assert_eq!(items.len(), 1);

    let added = items.add(Record::new().with("title", "two")).await.unwrap();
    assert_eq!(added.get("title"), Value::from("two"));
    let ul = doc.query_selector(doc.root(), "ul").unwrap();
    let texts: Vec<String> = doc
        .element_children(ul)
        .into_iter()
        .map(|li| doc.text_content(li))
        .collect();
    assert_eq!(texts, vec!["one", "two"]);

    let removed = items.delete(0).await.unwrap();
    assert_eq!(removed.get("title"), Value::from("one"));
    assert!(removed.is_disposed());
    assert_eq!(doc.element_children(ul).len(), 1);
    assert_eq!(items.get(0).unwrap().get("title"), Value::from("two"));
}

/// Length after a batch equals initial + adds - deletes.
#[tokio::test]
async fn collection_length_arithmetic() {
    let (rt, _doc) = page(
        r#"<ul mx-data="list"><li mx-item="rows">a</li><li mx-item="rows">b</li><li mx-item="rows">c</li></ul>"#,
    );
    rt.component("list", Record::new()).unwrap();
    rt.start();

    let rows = rt.instance("list").unwrap().get("rows").as_collection().cloned().unwrap();
    let initial = rows.len();
    let adds = [
        rows.add(Record::new()),
        rows.add(Record::new()),
        rows.prepend(Record::new()),
    ];
    let deletes = [rows.delete(0), rows.delete(0)];
    for completion in adds {
        completion.await;
    }
    for completion in deletes {
        completion.await;
    }
    assert_eq!(rows.len(), initial + 3 - 2);
}

/// A destroyed and re-added component starts with no watchers.
#[test]
fn destroy_and_re_add_leaves_no_stale_watchers() {
    let (rt, doc) = page(r#"<main><div id="w" mx-data="widget"><b :text="n">0</b></div></main>"#);
    let destroyed = Arc::new(AtomicI32::new(0));
    let counter = destroyed.clone();
    rt.component(
        "widget",
        Record::new().method("destroy", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Undefined)
        }),
    )
    .unwrap();
    rt.start();

    let fired = Arc::new(AtomicI32::new(0));
    let watcher = fired.clone();
    rt.watch("$widget.n", move |_, _| {
        watcher.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    let old = rt.instance("widget").unwrap();

    let main = doc.query_selector(doc.root(), "main").unwrap();
    let el = doc.query_selector(doc.root(), "#w").unwrap();
    doc.remove(el);
    rt.flush();
    assert!(rt.instance("widget").is_none());
    assert!(old.is_disposed());
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    doc.append_child(main, el);
    rt.flush();
    let fresh = rt.instance("widget").expect("rehydrated");
    assert!(!fresh.ptr_eq(&old));
    assert_eq!(fresh.watcher_count(), 0);

    fresh.set("n", 9);
    old.set("n", 10);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(text_of(&doc, "b"), "9");
}

/// Without a transition, visibility changes at once.
#[test]
fn visibility_without_transition() {
    let (rt, doc) = page(r#"<div mx-data="m"><p mx-show="open">x</p></div>"#);
    rt.component("m", Record::new().with("open", true)).unwrap();
    rt.start();

    let p = doc.query_selector(doc.root(), "p").unwrap();
    assert!(!doc.is_hidden(p));
    rt.eval("CuboMX.m.open = false").unwrap();
    assert!(doc.is_hidden(p));
}

/// With a transition, hiding runs leave phases and hides once settled.
#[test]
fn visibility_with_transition() {
    let (rt, doc) = page(r#"<div mx-data="m"><p mx-show="open" mx-transition="fade">x</p></div>"#);
    rt.component("m", Record::new().with("open", true)).unwrap();
    rt.start();

    let p = doc.query_selector(doc.root(), "p").unwrap();
    let m = rt.instance("m").unwrap();
    m.set("open", false);
    assert!(doc.has_class(p, "fade-leave-start"));
    assert!(!doc.is_hidden(p));

    rt.frame();
    rt.frame();
    assert!(doc.has_class(p, "fade-leave-end"));
    assert!(!doc.has_class(p, "fade-leave-start"));
    assert!(!doc.is_hidden(p));

    rt.advance(Duration::from_millis(50));
    assert!(doc.is_hidden(p));
    assert!(doc.class_names(p).is_empty());

    m.set("open", true);
    assert!(!doc.is_hidden(p));
    assert!(doc.has_class(p, "fade-enter-start"));
}

/// A handler in one component calls a method on another.
#[test]
fn cross_instance_method_call() {
    let (rt, doc) = page(
        r#"<div mx-data="A"><span :text="last">-</span></div><div mx-data="B"><button @click="CuboMX.A.receive(42)">send</button></div>"#,
    );
    rt.component(
        "A",
        Record::new().method("receive", |cx, args| {
            if let Some(this) = cx.this {
                this.set("last", args.first().cloned().unwrap_or_default());
            }
            Ok(Value::Undefined)
        }),
    )
    .unwrap();
    rt.component("B", Record::new()).unwrap();
    rt.start();

    let button = doc.query_selector(doc.root(), "button").unwrap();
    rt.dispatch(button, &Event::new("click"));
    assert_eq!(rt.instance("A").unwrap().get("last"), Value::from(42));
    assert_eq!(text_of(&doc, "span"), "42");
}

/// A custom global name is honored by expressions.
#[test]
fn configured_global_name() {
    init_tracing();
    let doc = Document::parse(r#"<div mx-data="c"><i :text="n">0</i></div>"#);
    let config = Config::from_json(r#"{"global_name": "App"}"#).unwrap();
    let rt = Runtime::with_config(doc.clone(), config);
    rt.component("c", Record::new()).unwrap();
    rt.start();

    rt.eval("App.c.n = 3").unwrap();
    assert_eq!(text_of(&doc, "i"), "3");
}

/// Swapped markup hydrates, and a factory component gets its own instance.
#[tokio::test]
async fn swap_hydrates_factories() {
    let (rt, doc) = page(r#"<section id="list"></section>"#);
    rt.component(
        "card",
        cubomx_core::Definition::factory(|| Record::new().with("open", false)),
    )
    .unwrap();
    rt.start();

    let html = r#"<div mx-data="card()" mx-ref="first"></div><div mx-data="card()"></div>"#;
    rt.swap(html, &[Strategy::new("#list:beforeend")]).await;

    assert!(rt.instance("first").is_some());
    assert_eq!(rt.instance_names().len(), 2);
    let list = doc.query_selector(doc.root(), "#list").unwrap();
    assert_eq!(doc.element_children(list).len(), 2);
}

/// Navigating through a link and going back restores the old region.
#[tokio::test]
async fn link_navigation_and_history() {
    let (rt, doc) = page(
        r##"<nav><a href="/two" mx-link mx-target="#content">two</a></nav><div id="content"><div mx-data="one"><b :text="label">first</b></div></div>"##,
    );
    rt.set_transport(StaticTransport::new().route(
        "/two",
        RawResponse::ok(r#"<div mx-data="two"><b :text="label">second</b></div>"#),
    ));
    rt.component("one", Record::new()).unwrap();
    rt.component("two", Record::new()).unwrap();
    rt.start();

    let link = doc.query_selector(doc.root(), "a").unwrap();
    rt.dispatch(link, &Event::new("click"));
    rt.idle().await;

    assert_eq!(doc.location(), "/two");
    assert!(rt.instance("one").is_none());
    assert_eq!(rt.instance("two").unwrap().get("label"), Value::from("second"));

    assert!(rt.back());
    assert_eq!(doc.location(), "/");
    assert!(rt.instance("two").is_none());
    assert_eq!(rt.instance("one").unwrap().get("label"), Value::from("first"));

    assert!(rt.forward());
    assert!(rt.instance("two").is_some());
    assert!(!rt.forward());
}
