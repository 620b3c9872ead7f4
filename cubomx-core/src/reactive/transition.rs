//! Visibility transitions.
//!
//! An element with `mx-transition="fade"` is shown and hidden in phases
//! rather than at once:
//!
//! 1. Enter: clear `display: none`, add `fade-enter-start`.
//! 2. Two animation frames later swap it for `fade-enter-end`.
//! 3. On `transitionend`, or after the inline `transition-duration` plus the
//!    configured buffer, remove `fade-enter-end`.
//!
//! Leave runs the same phases with `fade-leave-*` and sets `display: none`
//! once it settles. Every toggle takes a fresh token for the element; a
//! callback holding a stale token does nothing, so a new toggle cancels the
//! one in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::dom::{Document, EventTarget, ListenerId, NodeId};
use crate::runtime::Runtime;

struct Phase {
    start: String,
    end: String,
    hide_after: bool,
}

impl Phase {
    fn new(name: &str, stage: &str, hide_after: bool) -> Self {
        Self {
            start: format!("{name}-{stage}-start"),
            end: format!("{name}-{stage}-end"),
            hide_after,
        }
    }
}

/// Show or hide `el`, animating when it declares a transition and `animate`
/// is set.
pub(crate) fn apply_visibility(runtime: &Runtime, el: NodeId, visible: bool, animate: bool) {
    let document = runtime.document();
    let name = document
        .attribute(el, &runtime.config().markers.transition)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let token = runtime.begin_transition(el);

    let Some(name) = name.filter(|_| animate) else {
        set_displayed(&document, el, visible);
        return;
    };

    clear_phase_classes(&document, el, &name);
    if visible {
        set_displayed(&document, el, true);
        run(runtime, el, token, Phase::new(&name, "enter", false));
    } else {
        run(runtime, el, token, Phase::new(&name, "leave", true));
    }
}

fn set_displayed(document: &Document, el: NodeId, visible: bool) {
    let value = if visible { None } else { Some("none") };
    document.set_style_property(el, "display", value);
}

fn clear_phase_classes(document: &Document, el: NodeId, name: &str) {
    for stage in ["enter", "leave"] {
        let phase = Phase::new(name, stage, false);
        document.remove_class(el, &phase.start);
        document.remove_class(el, &phase.end);
    }
}

fn run(runtime: &Runtime, el: NodeId, token: u64, phase: Phase) {
    runtime.document().add_class(el, &phase.start);
    trace!(element = %el, class = %phase.start, "transition started");

    let weak = runtime.downgrade();
    runtime.scheduler().request_frame(Box::new(move || {
        let Some(runtime) = weak.upgrade() else {
            return;
        };
        if !runtime.transition_current(el, token) {
            return;
        }
        let weak = runtime.downgrade();
        runtime.scheduler().request_frame(Box::new(move || {
            let Some(runtime) = weak.upgrade() else {
                return;
            };
            if !runtime.transition_current(el, token) {
                return;
            }
            let document = runtime.document();
            document.remove_class(el, &phase.start);
            document.add_class(el, &phase.end);
            settle(&runtime, el, token, phase);
        }));
    }));
}

fn settle(runtime: &Runtime, el: NodeId, token: u64, phase: Phase) {
    let document = runtime.document();
    let settled = Arc::new(AtomicBool::new(false));
    let listener: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
    let delay = transition_duration(&document, el) + runtime.config().transition_buffer();

    let finish: Arc<dyn Fn() + Send + Sync> = {
        let weak = runtime.downgrade();
        let settled = settled.clone();
        let listener = listener.clone();
        Arc::new(move || {
            if settled.swap(true, Ordering::SeqCst) {
                return;
            }
            let Some(runtime) = weak.upgrade() else {
                return;
            };
            let document = runtime.document();
            if let Some(id) = listener.lock().take() {
                document.remove_listener(id);
            }
            if !runtime.transition_current(el, token) {
                return;
            }
            document.remove_class(el, &phase.end);
            if phase.hide_after {
                set_displayed(&document, el, false);
            }
            trace!(element = %el, "transition settled");
        })
    };

    let on_end = finish.clone();
    let id = document.add_listener(EventTarget::Node(el), "transitionend", Some(el), move |event| {
        if event.target() == Some(el) {
            on_end();
        }
    });
    *listener.lock() = Some(id);
    if settled.load(Ordering::SeqCst) {
        document.remove_listener(id);
    }

    runtime
        .scheduler()
        .set_timeout(delay, Box::new(move || finish()));
}

/// The longest duration listed in the inline `transition-duration`.
fn transition_duration(document: &Document, el: NodeId) -> Duration {
    document
        .style_property(el, "transition-duration")
        .map(|list| {
            list.split(',')
                .filter_map(parse_duration)
                .max()
                .unwrap_or_default()
        })
        .unwrap_or_default()
}

fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let seconds = if let Some(ms) = raw.strip_suffix("ms") {
        ms.trim().parse::<f64>().ok()? / 1000.0
    } else {
        raw.strip_suffix('s')?.trim().parse::<f64>().ok()?
    };
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Event;

    fn setup(html: &str) -> (Runtime, NodeId) {
        let document = Document::parse(html);
        let el = document
            .query_selector(document.root(), "#t")
            .expect("target element");
        (Runtime::new(document), el)
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("150ms"), Some(Duration::from_millis(150)));
        assert_eq!(parse_duration(" 0.5s "), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("fast"), None);
    }

    #[test]
    fn leave_runs_phases_then_hides() {
        let (rt, el) = setup(
            r#"<div id="t" mx-transition="fade" style="transition-duration: 100ms"></div>"#,
        );
        let doc = rt.document();

        apply_visibility(&rt, el, false, true);
        assert!(doc.has_class(el, "fade-leave-start"));
        assert!(!doc.is_hidden(el));

        rt.frame();
        assert!(doc.has_class(el, "fade-leave-start"));
        rt.frame();
        assert!(!doc.has_class(el, "fade-leave-start"));
        assert!(doc.has_class(el, "fade-leave-end"));

        rt.advance(Duration::from_millis(100));
        assert!(!doc.is_hidden(el));
        rt.advance(rt.config().transition_buffer());
        assert!(!doc.has_class(el, "fade-leave-end"));
        assert!(doc.is_hidden(el));
    }

    #[test]
    fn transitionend_settles_early() {
        let (rt, el) = setup(r#"<div id="t" mx-transition="fade" style="display: none"></div>"#);
        let doc = rt.document();

        apply_visibility(&rt, el, true, true);
        assert!(!doc.is_hidden(el));
        assert!(doc.has_class(el, "fade-enter-start"));
        rt.frame();
        rt.frame();
        assert!(doc.has_class(el, "fade-enter-end"));

        doc.dispatch_event(el, &Event::new("transitionend"));
        assert!(!doc.has_class(el, "fade-enter-end"));
    }

    #[test]
    fn new_toggle_cancels_the_previous_one() {
        let (rt, el) = setup(r#"<div id="t" mx-transition="fade"></div>"#);
        let doc = rt.document();

        apply_visibility(&rt, el, false, true);
        apply_visibility(&rt, el, true, true);
        assert!(!doc.has_class(el, "fade-leave-start"));
        assert!(doc.has_class(el, "fade-enter-start"));

        rt.frame();
        rt.frame();
        rt.advance(Duration::from_secs(1));
        assert!(!doc.is_hidden(el));
        assert!(doc.class_names(el).is_empty());
    }

    #[test]
    fn initial_application_skips_the_animation() {
        let (rt, el) = setup(r#"<div id="t" mx-transition="fade"></div>"#);
        apply_visibility(&rt, el, false, false);
        assert!(rt.document().is_hidden(el));
        assert!(rt.document().class_names(el).is_empty());
    }
}
