//! Reactive Primitives
//!
//! This module implements the state side of CuboMX: instance proxies, the
//! reactions that mirror their properties into the document, and the two
//! managed containers a property can hold.
//!
//! # Concepts
//!
//! ## Proxies
//!
//! A [`Proxy`] wraps the record behind a store, a component or a list item.
//! Writing a property through the proxy stores the value and, when it
//! changed, runs every reaction and watcher registered for that property.
//!
//! ## Reactions
//!
//! A [`Reaction`] binds one property to one effect on one element: its text,
//! its markup, an attribute, its class list or its visibility.
//!
//! ## Class Lists
//!
//! A [`ClassList`] is installed in place of a plain value when a property
//! drives an element's `class`. Mutating it re-renders the bound elements.
//!
//! ## Item Collections
//!
//! An [`ItemCollection`] owns the proxies of repeated list items. Its methods
//! mutate the document; the lifecycle controller keeps the item array in
//! step with what the document observer reports.
//!
//! # Implementation Notes
//!
//! There is no dependency tracking. Reactions are registered explicitly by
//! the directive resolvers, so a write only has to look up the property's
//! reaction list.

mod class_list;
mod collection;
mod proxy;
mod reaction;
pub(crate) mod transition;
mod watcher;

pub use class_list::ClassList;
pub use collection::ItemCollection;
pub use proxy::{InstanceKind, Proxy};
pub use reaction::{Effect, Reaction};
pub use watcher::{WatchFn, Watcher, WatcherId};

