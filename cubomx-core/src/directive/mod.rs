//! Directive Resolvers
//!
//! One resolver per attribute family. Each takes an element, checks whether
//! it was already processed for its family, and registers the reactions and
//! listeners the attributes ask for. Failures are logged and the element is
//! skipped; hydration of the rest of the page continues.

pub(crate) mod bind;
pub(crate) mod item;
pub(crate) mod link;
pub(crate) mod on;
pub(crate) mod show;

use crate::dom::NodeId;
use crate::error::{Error, Result};
use crate::reactive::Proxy;
use crate::runtime::Runtime;

/// Which proxy a bare property name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// The nearest enclosing component.
    Component,
    /// The nearest enclosing list item.
    Item,
}

/// Resolve a binding path to its proxy and property.
///
/// `$name.prop` names a store or component directly; a bare `prop` belongs
/// to the nearest owner of the requested scope.
pub(crate) fn resolve_target(
    runtime: &Runtime,
    el: NodeId,
    path: &str,
    scope: Scope,
    attribute: &str,
) -> Result<(Proxy, String)> {
    if let Some(rest) = path.strip_prefix('$') {
        let (name, prop) = rest
            .split_once('.')
            .filter(|(name, prop)| !name.is_empty() && !prop.is_empty())
            .ok_or_else(|| Error::MalformedTarget(path.to_string()))?;
        let proxy = runtime
            .instance(name)
            .ok_or_else(|| Error::UnknownInstance(name.to_string()))?;
        return Ok((proxy, prop.to_string()));
    }

    let owner = match scope {
        Scope::Component => runtime.owner_of(el),
        Scope::Item => runtime.item_of(el),
    };
    owner
        .map(|proxy| (proxy, path.to_string()))
        .ok_or_else(|| Error::NoOwner {
            attribute: attribute.to_string(),
        })
}
