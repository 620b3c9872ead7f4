//! Navigation links (`mx-link`) and remote loads (`mx-load="url"`).
//!
//! A link intercepts clicks, fetches its URL (the `mx-link` value, or
//! `href` when that is empty) and swaps the response in through `mx-target`
//! and `mx-select`, recording a history entry. A load fetches its URL once,
//! when the element is hydrated, and swaps the response into the element
//! itself unless `mx-target` says otherwise.

use tracing::{debug, error, warn};

use crate::dom::{EventTarget, NodeId};
use crate::request::{request, RequestInit};
use crate::runtime::{Directive, Runtime};
use crate::swap::{Strategy, SwapMode};

fn strategies(runtime: &Runtime, el: NodeId, default_target: Option<&str>) -> Vec<Strategy> {
    let document = runtime.document();
    let markers = &runtime.config().markers;
    let targets = document
        .attribute(el, &markers.target)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| default_target.map(str::to_string));
    let selects = document.attribute(el, &markers.select);
    targets
        .map(|targets| Strategy::parse_list(&targets, selects.as_deref()))
        .unwrap_or_default()
}

fn link_url(runtime: &Runtime, el: NodeId) -> Option<String> {
    let document = runtime.document();
    document
        .attribute(el, &runtime.config().markers.link)
        .filter(|u| !u.trim().is_empty())
        .or_else(|| document.attribute(el, "href"))
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
}

pub(crate) fn resolve_link(runtime: &Runtime, el: NodeId) {
    let document = runtime.document();
    let markers = &runtime.config().markers;
    if !document.has_attribute(el, &markers.link) || !runtime.mark(el, Directive::Link) {
        return;
    }
    let Some(bound_url) = link_url(runtime, el) else {
        warn!(element = %el, "link skipped: no href");
        return;
    };

    let strategies = strategies(runtime, el, Some(&runtime.config().default_link_target));
    let weak = runtime.downgrade();
    let fallback_url = bound_url.clone();
    document.add_listener(EventTarget::Node(el), "click", Some(el), move |event| {
        let Some(runtime) = weak.upgrade() else {
            return;
        };
        let url = link_url(&runtime, el).unwrap_or_else(|| fallback_url.clone());
        event.prevent_default();
        runtime.navigate(&url, strategies.clone());
    });
    debug!(element = %el, url = %bound_url, "link bound");
}

pub(crate) fn resolve_load(runtime: &Runtime, el: NodeId) {
    let document = runtime.document();
    let markers = &runtime.config().markers;
    let Some(url) = document.attribute(el, &markers.load) else {
        return;
    };
    if !runtime.mark(el, Directive::Load) {
        return;
    }
    let url = url.trim().to_string();
    if url.is_empty() {
        warn!(element = %el, "load has no URL");
        return;
    }
    let Some(transport) = runtime.transport() else {
        error!(element = %el, url = %url, "load skipped: no transport installed");
        return;
    };

    let strategies = strategies(runtime, el, None);
    let weak = runtime.downgrade();
    runtime.spawn("load", async move {
        let response = match request(transport.as_ref(), RequestInit::get(url.as_str())).await {
            Ok(response) if response.ok => response,
            Ok(response) => {
                warn!(url = %url, status = response.status, "load got an error status");
                return;
            }
            Err(err) => {
                error!(url = %url, error = %err, "load failed");
                return;
            }
        };
        let Some(runtime) = weak.upgrade() else {
            return;
        };
        if strategies.is_empty() {
            runtime
                .swap_node(el, SwapMode::InnerHtml, &response.text, None)
                .await;
        } else {
            runtime.swap(&response.text, &strategies).await;
        }
        debug!(url = %url, "loaded");
    });
}
