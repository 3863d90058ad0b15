//! Lazy class lists.
//!
//! `$classes.<section>` is computed on first access and memoized per section
//! name. Each entry is a derived value, so it recomputes only when the props
//! it read change.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use spark_signals::{Derived, derived};

use super::NodeContext;
use crate::types::Value;

/// Computes the class list for one section.
pub type ClassResolver = Rc<dyn Fn(&str, &NodeContext) -> String>;

type ClassDerived = Derived<String>;

#[derive(Default)]
pub struct ClassCache {
    entries: RefCell<HashMap<String, Rc<ClassDerived>>>,
}

impl ClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current class list for `section`, creating the entry with `compute` on
    /// first access.
    pub fn get_or_compute(&self, section: &str, compute: impl FnOnce() -> Box<dyn Fn() -> String>) -> String {
        let existing = self.entries.borrow().get(section).cloned();
        let entry = match existing {
            Some(entry) => entry,
            None => {
                let entry = Rc::new(derived(compute()));
                self.entries
                    .borrow_mut()
                    .insert(section.to_string(), entry.clone());
                entry
            }
        };
        entry.get()
    }

    pub fn contains(&self, section: &str) -> bool {
        self.entries.borrow().contains_key(section)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// `<prefix>-<section>`, followed by whatever the `classes` prop assigns to
/// the section.
///
/// The `classes` prop may map a section to a string, or to an object of
/// `class: bool` toggles.
pub fn default_class_list(prefix: &str, section: &str, ctx: &NodeContext) -> String {
    let mut classes = vec![format!("{prefix}-{section}")];

    match ctx.prop("classes").get(section) {
        Value::String(extra) => classes.extend(extra.split_whitespace().map(str::to_owned)),
        Value::Object(toggles) => {
            for (name, on) in toggles {
                if on.is_truthy() {
                    classes.push(name.clone());
                } else {
                    classes.retain(|c| c.as_str() != name.as_str());
                }
            }
        }
        _ => {}
    }

    classes.dedup();
    classes.join(" ")
}
