//! CuboMX Core
//!
//! This crate provides the runtime for CuboMX, a declarative DOM-reactivity
//! framework. HTML attributes declare bindings between elements and a
//! reactive state graph; the runtime keeps the two in sync without a
//! virtual DOM.
//!
//! It implements:
//!
//! - Reactive proxies for components, stores and list items
//! - Reactions that mirror properties into elements, and watchers
//! - Directive resolution (`:attr`, `@event`, `mx-item`, `mx-show`,
//!   `mx-link`, `mx-load`)
//! - A lifecycle controller driven by document mutations
//! - A small expression language for event handlers
//! - Swap, request and history collaborators
//!
//! The document is headless: [`dom::Document`] is an in-memory element tree
//! with events, live form properties and a mutation-record queue.
//!
//! # Architecture
//!
//! - `value`: dynamic values, records and the attribute value parser
//! - `dom`: the headless document, selectors and events
//! - `reactive`: proxies, reactions, watchers, class lists, collections
//! - `runtime`: registries, scheduler, checkpoints and the lifecycle
//! - `expr`: lexer, parser and evaluator for handler expressions
//! - `swap`, `request`, `history`: fragment swapping and navigation
//!
//! # Example
//!
//! ```rust
//! use cubomx_core::{Document, Event, Record, Runtime, Value};
//!
//! let doc = Document::parse(
//!     r#"<div mx-data="counter"><span :text="n">0</span><button @click="n++">+</button></div>"#,
//! );
//! let runtime = Runtime::new(doc.clone());
//! runtime.component("counter", Record::new()).unwrap();
//! runtime.start();
//!
//! let button = doc.query_selector(doc.root(), "button").unwrap();
//! runtime.dispatch(button, &Event::new("click"));
//!
//! let span = doc.query_selector(doc.root(), "span").unwrap();
//! assert_eq!(doc.text_content(span), "1");
//! assert_eq!(runtime.instance("counter").unwrap().get("n"), Value::from(1));
//! ```

pub mod config;
pub(crate) mod directive;
pub mod dom;
pub mod error;
pub mod expr;
pub mod history;
pub mod reactive;
pub mod request;
pub mod runtime;
pub mod swap;
pub mod value;

pub use config::Config;
pub use dom::{Document, Event, NodeId};
pub use error::{Error, Result};
pub use history::{History, Snapshot};
pub use reactive::{ClassList, ItemCollection, Proxy, WatcherId};
pub use request::{request, RawResponse, RequestInit, Response, StaticTransport, Transport};
pub use runtime::{Completion, Definition, Runtime};
pub use swap::{Strategy, SwapMode};
pub use value::{Function, Record, Value};
