//! Swap Engine
//!
//! Parses an HTML string and moves parts of it into the document. Each
//! [`Strategy`] names a target as `selector:mode` and, optionally, a
//! selector picking the fragment to insert. The observer picks the inserted
//! nodes up like any other mutation, so swapped-in directives hydrate and
//! swapped-out components are destroyed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::dom::{Document, NodeId, Selector};
use crate::error::{Error, Result};
use crate::runtime::{Completion, Runtime};

/// Where fragment nodes go relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SwapMode {
    /// Replace the target's children.
    #[default]
    #[serde(rename = "innerHTML")]
    InnerHtml,
    /// Replace the target itself.
    #[serde(rename = "outerHTML")]
    OuterHtml,
    #[serde(rename = "beforebegin")]
    BeforeBegin,
    #[serde(rename = "afterbegin")]
    AfterBegin,
    #[serde(rename = "beforeend")]
    BeforeEnd,
    #[serde(rename = "afterend")]
    AfterEnd,
}

impl FromStr for SwapMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "innerhtml" => Ok(SwapMode::InnerHtml),
            "outerhtml" => Ok(SwapMode::OuterHtml),
            "beforebegin" => Ok(SwapMode::BeforeBegin),
            "afterbegin" => Ok(SwapMode::AfterBegin),
            "beforeend" => Ok(SwapMode::BeforeEnd),
            "afterend" => Ok(SwapMode::AfterEnd),
            _ => Err(Error::MalformedTarget(s.to_string())),
        }
    }
}

impl fmt::Display for SwapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SwapMode::InnerHtml => "innerHTML",
            SwapMode::OuterHtml => "outerHTML",
            SwapMode::BeforeBegin => "beforebegin",
            SwapMode::AfterBegin => "afterbegin",
            SwapMode::BeforeEnd => "beforeend",
            SwapMode::AfterEnd => "afterend",
        })
    }
}

/// One target of a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// `selector` or `selector:mode`.
    pub target: String,
    /// Selector for the part of the fragment to insert; all of it if unset.
    #[serde(default)]
    pub select: Option<String>,
}

impl Strategy {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            select: None,
        }
    }

    pub fn select(mut self, selector: impl Into<String>) -> Self {
        self.select = Some(selector.into());
        self
    }

    /// Build strategies from comma-separated `mx-target` and `mx-select`
    /// values, pairing them by position.
    pub fn parse_list(targets: &str, selects: Option<&str>) -> Vec<Strategy> {
        let selects: Vec<&str> = selects
            .map(|s| s.split(',').map(str::trim).collect())
            .unwrap_or_default();
        targets
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, target)| Strategy {
                target: target.to_string(),
                select: selects
                    .get(i)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string()),
            })
            .collect()
    }

    /// Split the target into its selector and mode. The mode suffix is
    /// stripped before the selector is parsed.
    pub fn split_target(&self) -> Result<(Selector, SwapMode)> {
        let target = self.target.trim();
        let (selector, mode) = match target.rsplit_once(':') {
            Some((selector, mode)) => match mode.parse::<SwapMode>() {
                Ok(mode) => (selector, mode),
                Err(_) => (target, SwapMode::InnerHtml),
            },
            None => (target, SwapMode::InnerHtml),
        };
        Ok((Selector::parse(selector)?, mode))
    }
}

impl Runtime {
    /// Insert `html` into the document once per strategy.
    ///
    /// The returned completion resolves once every inserted node has been
    /// hydrated and every displaced node torn down. Strategies that fail are
    /// logged and skipped.
    pub fn swap(&self, html: &str, strategies: &[Strategy]) -> Completion {
        let document = self.document();
        let mut completion = Completion::new(self);
        for strategy in strategies {
            let result = strategy.split_target().and_then(|(selector, mode)| {
                let target = document
                    .select(document.root(), &selector)
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::TargetNotFound(selector.as_str().to_string()))?;
                self.swap_into(&document, target, mode, html, strategy.select.as_deref(), &mut completion)
            });
            if let Err(err) = result {
                error!(target = %strategy.target, error = %err, "swap strategy skipped");
            }
        }
        completion
    }

    /// Swap `html` into a known node.
    pub(crate) fn swap_node(
        &self,
        target: NodeId,
        mode: SwapMode,
        html: &str,
        select: Option<&str>,
    ) -> Completion {
        let document = self.document();
        let mut completion = Completion::new(self);
        if let Err(err) = self.swap_into(&document, target, mode, html, select, &mut completion) {
            error!(target = %target, error = %err, "swap skipped");
        }
        completion
    }

    fn swap_into(
        &self,
        document: &Document,
        target: NodeId,
        mode: SwapMode,
        html: &str,
        select: Option<&str>,
        completion: &mut Completion,
    ) -> Result<()> {
        let nodes = fragment_nodes(document, html, select)?;
        let tracking = document.is_observing();
        let pending = self.pending();
        let mut insert = |parent: NodeId, node: NodeId, reference: Option<NodeId>| {
            if tracking {
                completion.push_hydration(pending.expect_hydration(node, None));
            }
            document.insert_before(parent, node, reference);
        };

        let parent = || {
            document
                .parent(target)
                .ok_or_else(|| Error::TargetNotFound(format!("parent of {target}")))
        };

        let mut displaced = Vec::new();
        match mode {
            SwapMode::InnerHtml => {
                displaced = document.children(target);
                for child in &displaced {
                    document.remove(*child);
                }
                for node in nodes {
                    insert(target, node, None);
                }
            }
            SwapMode::OuterHtml => {
                let parent = parent()?;
                for node in nodes {
                    insert(parent, node, Some(target));
                }
                document.remove(target);
                displaced.push(target);
            }
            SwapMode::BeforeBegin => {
                let parent = parent()?;
                for node in nodes {
                    insert(parent, node, Some(target));
                }
            }
            SwapMode::AfterBegin => {
                let first = document.children(target).first().copied();
                for node in nodes {
                    insert(target, node, first);
                }
            }
            SwapMode::BeforeEnd => {
                for node in nodes {
                    insert(target, node, None);
                }
            }
            SwapMode::AfterEnd => {
                let parent = parent()?;
                let next = document.next_sibling(target);
                for node in nodes {
                    insert(parent, node, next);
                }
            }
        }

        if tracking {
            for node in displaced {
                completion.push_teardown(pending.expect_teardown(node));
            }
        }
        debug!(target = %target, %mode, "swapped");
        Ok(())
    }
}

/// Parse `html` and pick the nodes to insert.
fn fragment_nodes(document: &Document, html: &str, select: Option<&str>) -> Result<Vec<NodeId>> {
    let roots = document.parse_fragment(html);
    let Some(select) = select else {
        return Ok(roots);
    };
    let selector = Selector::parse(select)?;
    for root in &roots {
        if document.matches(*root, &selector) {
            return Ok(vec![*root]);
        }
        if let Some(found) = document.select(*root, &selector).into_iter().next() {
            document.remove(found);
            return Ok(vec![found]);
        }
    }
    Err(Error::TargetNotFound(select.to_string()))
}
