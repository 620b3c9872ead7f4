//! Minimal CSS selectors for swap targets and history snapshots.
//!
//! Supported: type selectors, `#id`, `.class`, `[attr]`, `[attr=value]`,
//! `*`, compounds of these, and the descendant combinator (whitespace).

use super::{NodeId, Tree};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, tree: &Tree, node: NodeId) -> bool {
        let Some(el) = tree.element(node) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if *tag != el.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.attrs.get("id") != Some(id) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes: Vec<&str> = el
                .attrs
                .get("class")
                .map(|c| c.split_whitespace().collect())
                .unwrap_or_default();
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|(name, value)| match value {
            Some(value) => el.attrs.get(name) == Some(value),
            None => el.attrs.contains_key(name),
        })
    }
}

/// A parsed selector: compounds joined by descendant combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    chain: Vec<Compound>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = || Error::Selector(source.to_string());
        let mut chain = Vec::new();
        let chars: Vec<char> = source.trim().chars().collect();
        let mut i = 0;
        let mut current = Compound::default();
        let mut has_current = false;

        let ident = |i: &mut usize| -> String {
            let mut out = String::new();
            while *i < chars.len()
                && (chars[*i].is_alphanumeric() || matches!(chars[*i], '-' | '_' | ':' | '$' | '@'))
            {
                out.push(chars[*i]);
                *i += 1;
            }
            out
        };

        while i < chars.len() {
            match chars[i] {
                c if c.is_whitespace() => {
                    if has_current {
                        chain.push(std::mem::take(&mut current));
                        has_current = false;
                    }
                    i += 1;
                }
                '#' => {
                    i += 1;
                    let id = ident(&mut i);
                    if id.is_empty() {
                        return Err(invalid());
                    }
                    current.id = Some(id);
                    has_current = true;
                }
                '.' => {
                    i += 1;
                    let class = ident(&mut i);
                    if class.is_empty() {
                        return Err(invalid());
                    }
                    current.classes.push(class);
                    has_current = true;
                }
                '*' => {
                    i += 1;
                    has_current = true;
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .ok_or_else(invalid)?;
                    let body: String = chars[i + 1..i + close].iter().collect();
                    let (name, value) = match body.split_once('=') {
                        Some((name, value)) => {
                            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                            (name.trim().to_string(), Some(value.to_string()))
                        }
                        None => (body.trim().to_string(), None),
                    };
                    if name.is_empty() {
                        return Err(invalid());
                    }
                    current.attrs.push((name.to_ascii_lowercase(), value));
                    has_current = true;
                    i += close + 1;
                }
                c if c.is_alphabetic() => {
                    let tag = ident(&mut i);
                    current.tag = Some(tag.to_ascii_lowercase());
                    has_current = true;
                }
                _ => return Err(invalid()),
            }
        }
        if has_current {
            chain.push(current);
        }
        if chain.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            source: source.trim().to_string(),
            chain,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn matches(&self, tree: &Tree, node: NodeId) -> bool {
        let Some((last, ancestors)) = self.chain.split_last() else {
            return false;
        };
        if !last.matches(tree, node) {
            return false;
        }
        let mut current = tree.parent(node);
        for compound in ancestors.iter().rev() {
            loop {
                let Some(candidate) = current else {
                    return false;
                };
                current = tree.parent(candidate);
                if compound.matches(tree, candidate) {
                    break;
                }
            }
        }
        true
    }
}
