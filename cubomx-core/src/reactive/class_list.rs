//! Reactive class lists.
//!
//! Installed on a property that drives an element's `class` attribute. The
//! list remembers which property of which instance it belongs to and
//! re-renders that property's reactions after every mutation.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::proxy::{Proxy, ProxyInner};
use crate::value::Value;

struct ClassListInner {
    classes: RwLock<Vec<String>>,
    owner: Weak<ProxyInner>,
    prop: String,
}

/// An ordered, duplicate-free set of class names.
#[derive(Clone)]
pub struct ClassList {
    inner: Arc<ClassListInner>,
}

impl ClassList {
    pub(crate) fn new(owner: &Proxy, prop: &str, classes: Vec<String>) -> Self {
        Self {
            inner: Arc::new(ClassListInner {
                classes: RwLock::new(dedup(classes)),
                owner: owner.downgrade(),
                prop: prop.to_string(),
            }),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.inner.classes.read().clone()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.inner.classes.read().iter().any(|c| c == class)
    }

    pub fn len(&self) -> usize {
        self.inner.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.classes.read().is_empty()
    }

    /// Add a class. No-op if already present.
    pub fn add(&self, class: &str) {
        let class = class.trim();
        if class.is_empty() || self.contains(class) {
            return;
        }
        self.inner.classes.write().push(class.to_string());
        self.rerender();
    }

    /// Remove a class. No-op if absent.
    pub fn remove(&self, class: &str) {
        let removed = {
            let mut classes = self.inner.classes.write();
            let before = classes.len();
            classes.retain(|c| c != class);
            classes.len() != before
        };
        if removed {
            self.rerender();
        }
    }

    /// Flip a class. Returns whether it is present afterwards.
    pub fn toggle(&self, class: &str) -> bool {
        if self.contains(class) {
            self.remove(class);
            false
        } else {
            self.add(class);
            true
        }
    }

    /// Replace the whole contents.
    pub fn replace(&self, classes: Vec<String>) {
        *self.inner.classes.write() = dedup(classes);
        self.rerender();
    }

    pub fn ptr_eq(&self, other: &ClassList) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn rerender(&self) {
        if let Some(owner) = self.inner.owner.upgrade() {
            Proxy::from_inner(owner).rerender(&self.inner.prop);
        }
    }
}

impl std::fmt::Debug for ClassList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassList")
            .field("prop", &self.inner.prop)
            .field("classes", &*self.inner.classes.read())
            .finish()
    }
}

fn dedup(classes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(classes.len());
    for class in classes {
        if !class.is_empty() && !out.contains(&class) {
            out.push(class);
        }
    }
    out
}

/// The class names a value stands for, or `None` if it cannot be a class
/// list. Strings split on whitespace; arrays contribute their truthy
/// entries.
pub(crate) fn class_names_of(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(s.split_whitespace().map(str::to_string).collect()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter(|v| v.is_truthy())
                .flat_map(|v| {
                    v.to_display_string()
                        .split_whitespace()
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .collect(),
        ),
        Value::ClassList(list) => Some(list.to_vec()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::InstanceKind;
    use crate::runtime::WeakRuntime;
    use crate::value::Record;

    fn list(classes: &[&str]) -> (Proxy, ClassList) {
        let owner = Proxy::new("owner", InstanceKind::Store, None, Record::new(), WeakRuntime::default());
        let list = ClassList::new(&owner, "cls", classes.iter().map(|c| c.to_string()).collect());
        (owner, list)
    }

    #[test]
    fn add_remove_toggle() {
        let (_owner, list) = list(&["a"]);
        list.add("b");
        list.add("a");
        assert_eq!(list.to_vec(), vec!["a", "b"]);

        list.remove("a");
        assert_eq!(list.to_vec(), vec!["b"]);

        assert!(list.toggle("c"));
        assert!(!list.toggle("b"));
        assert_eq!(list.to_vec(), vec!["c"]);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let (_owner, list) = list(&["a", "a", "", "b"]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn class_names_from_values() {
        assert_eq!(
            class_names_of(&Value::from(" x  y ")),
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(
            class_names_of(&Value::array(vec!["x".into(), Value::Null, false.into(), "z".into()])),
            Some(vec!["x".to_string(), "z".to_string()])
        );
        assert_eq!(class_names_of(&Value::from(3)), None);
    }
}
