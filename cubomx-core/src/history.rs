//! Navigation and History
//!
//! Navigating fetches a page through the transport and swaps parts of it
//! into the document. Before the swap the affected regions are captured in a
//! [`Snapshot`]; `back` and `forward` put a captured snapshot back through
//! the same swap pipeline, so components inside restored markup hydrate
//! again and the ones they displace are destroyed.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::dom::Document;
use crate::request::{request, RequestInit};
use crate::runtime::Runtime;
use crate::swap::Strategy;

/// Markup of one swapped region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub selector: String,
    pub html: String,
}

/// A page state that can be restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub title: String,
    pub fragments: Vec<Fragment>,
}

impl Snapshot {
    /// Capture the inner markup of the first element matching each selector.
    pub fn capture(document: &Document, selectors: &[String]) -> Self {
        let fragments = selectors
            .iter()
            .filter_map(|selector| {
                let node = document.query_selector(document.root(), selector)?;
                Some(Fragment {
                    selector: selector.clone(),
                    html: document.inner_html(node),
                })
            })
            .collect();
        Self {
            url: document.location(),
            title: document.title(),
            fragments,
        }
    }

    fn selectors(&self) -> Vec<String> {
        self.fragments.iter().map(|f| f.selector.clone()).collect()
    }
}

/// Visited pages, oldest first.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<Snapshot>,
    current: usize,
}

impl History {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.current)
    }

    pub fn entries(&self) -> &[Snapshot] {
        &self.entries
    }

    pub fn can_go_back(&self) -> bool {
        !self.entries.is_empty() && self.current > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.current + 1 < self.entries.len()
    }

    /// Record a navigation from `leaving` to `arriving`. Forward entries
    /// are discarded.
    pub(crate) fn push(&mut self, leaving: Snapshot, arriving: Snapshot) {
        if self.entries.is_empty() {
            self.entries.push(leaving);
        } else {
            self.entries.truncate(self.current + 1);
            self.entries[self.current] = leaving;
        }
        self.entries.push(arriving);
        self.current = self.entries.len() - 1;
    }

    /// Move by `delta` entries, storing `leaving` in the current slot.
    /// Returns the snapshot to restore.
    pub(crate) fn step(&mut self, leaving: Snapshot, delta: isize) -> Option<Snapshot> {
        let target = self.current.checked_add_signed(delta)?;
        if target >= self.entries.len() {
            return None;
        }
        self.entries[self.current] = leaving;
        self.current = target;
        self.entries.get(target).cloned()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.current = 0;
    }
}

impl Runtime {
    /// Fetch `url` and swap it in with `strategies`, recording a history
    /// entry. Runs in the background; see [`Runtime::idle`].
    pub fn navigate(&self, url: &str, strategies: Vec<Strategy>) {
        let Some(transport) = self.transport() else {
            error!(url, "navigation skipped: no transport installed");
            return;
        };
        let selectors: Vec<String> = strategies
            .iter()
            .filter_map(|s| s.split_target().ok())
            .map(|(selector, _)| selector.as_str().to_string())
            .collect();
        let leaving = Snapshot::capture(&self.document(), &selectors);
        let url = url.to_string();
        let weak = self.downgrade();

        self.spawn("navigate", async move {
            let response = match request(transport.as_ref(), RequestInit::get(url.as_str())).await {
                Ok(response) => response,
                Err(err) => {
                    error!(url = %url, error = %err, "navigation failed");
                    return;
                }
            };
            if !response.ok {
                warn!(url = %url, status = response.status, "navigation got an error status");
                return;
            }
            let Some(runtime) = weak.upgrade() else {
                return;
            };

            runtime.swap(&response.text, &strategies).await;
            let document = runtime.document();
            let title = Document::parse(&response.text).title();
            if !title.is_empty() {
                document.set_title(&title);
            }
            document.set_location(response.redirect.as_deref().unwrap_or(&response.url));

            let arriving = Snapshot::capture(&document, &selectors);
            debug!(url = %arriving.url, "navigated");
            runtime.history().lock().push(leaving, arriving);
        });
    }

    /// Restore the previous history entry. Returns `false` at the start.
    pub fn back(&self) -> bool {
        self.travel(-1)
    }

    /// Restore the next history entry. Returns `false` at the end.
    pub fn forward(&self) -> bool {
        self.travel(1)
    }

    fn travel(&self, delta: isize) -> bool {
        let document = self.document();
        let selectors = match self.history().lock().current() {
            Some(current) => current.selectors(),
            None => return false,
        };
        let leaving = Snapshot::capture(&document, &selectors);
        let target = self.history().lock().step(leaving, delta);
        let Some(snapshot) = target else {
            return false;
        };
        self.restore(&snapshot);
        true
    }

    fn restore(&self, snapshot: &Snapshot) {
        let document = self.document();
        for fragment in &snapshot.fragments {
            let strategy = Strategy::new(format!("{}:innerHTML", fragment.selector));
            let _completion = self.swap(&fragment.html, &[strategy]);
        }
        document.set_title(&snapshot.title);
        document.set_location(&snapshot.url);
        self.flush();
        debug!(url = %snapshot.url, "history restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: &str) -> Snapshot {
        Snapshot {
            url: url.into(),
            title: String::new(),
            fragments: Vec::new(),
        }
    }

    #[test]
    fn push_and_step() {
        let mut history = History::default();
        assert!(!history.can_go_back());

        history.push(snapshot("/a"), snapshot("/b"));
        history.push(snapshot("/b"), snapshot("/c"));
        assert_eq!(history.len(), 3);
        assert_eq!(history.current().map(|s| s.url.as_str()), Some("/c"));

        let back = history.step(snapshot("/c"), -1).unwrap();
        assert_eq!(back.url, "/b");
        assert!(history.can_go_forward());

        // Navigating from the middle drops the forward entries.
        history.push(snapshot("/b"), snapshot("/d"));
        let urls: Vec<_> = history.entries().iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["/a", "/b", "/d"]);
        assert!(history.step(snapshot("/d"), 1).is_none());
    }

    #[test]
    fn capture_reads_regions() {
        let doc = Document::parse(r#"<title>T</title><main id="m"><p>x</p></main>"#);
        doc.set_location("/here");
        let snap = Snapshot::capture(&doc, &["#m".to_string(), "#missing".to_string()]);
        assert_eq!(snap.url, "/here");
        assert_eq!(snap.title, "T");
        assert_eq!(
            snap.fragments,
            vec![Fragment {
                selector: "#m".into(),
                html: "<p>x</p>".into()
            }]
        );

        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(serde_json::from_str::<Snapshot>(&json).unwrap(), snap);
    }
}
