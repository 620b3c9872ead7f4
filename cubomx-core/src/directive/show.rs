//! Visibility bindings: `mx-show="prop"` and `mx-show="!prop"`.
//!
//! The first evaluation is applied immediately, without a transition, and
//! `mx-cloak` is removed once it has been. A bare property is looked up on
//! the nearest item when that item has it, otherwise on the nearest
//! component.

use tracing::{error, trace};

use super::{resolve_target, Scope};
use crate::dom::NodeId;
use crate::reactive::{Effect, Reaction};
use crate::runtime::{Directive, Runtime};

pub(crate) fn resolve(runtime: &Runtime, el: NodeId) {
    let document = runtime.document();
    let markers = &runtime.config().markers;
    let Some(raw) = document.attribute(el, &markers.show) else {
        return;
    };
    if !runtime.mark(el, Directive::Show) {
        return;
    }

    let raw = raw.trim();
    let (negate, path) = match raw.strip_prefix('!') {
        Some(path) => (true, path.trim()),
        None => (false, raw),
    };

    let scope = match runtime.item_of(el) {
        Some(item) if !path.starts_with('$') && item.has(path) => Scope::Item,
        _ => Scope::Component,
    };
    let (proxy, prop) = match resolve_target(runtime, el, path, scope, &markers.show) {
        Ok(target) => target,
        Err(err) => {
            error!(element = %el, error = %err, "visibility binding skipped");
            return;
        }
    };

    let reaction = Reaction::new(el, Effect::Visibility { negate });
    proxy.add_reaction(&prop, reaction.clone());
    reaction.apply(runtime, &proxy.get(&prop), false);
    document.remove_attribute(el, &markers.cloak);
    trace!(element = %el, instance = %proxy.name(), prop = %prop, negate, "visibility bound");
}
