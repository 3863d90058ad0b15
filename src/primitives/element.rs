//! Element Primitive - Elements, components and unwrapped sections.
//!
//! An element allocates one output node, binds its attributes, then mounts
//! its children with itself as the parent. A `None` tag allocates a fragment
//! instead, so the children render in place.
//!
//! # Attribute precedence
//!
//! 1. Keys spread from `bind`
//! 2. Explicit `attrs` (win on collision)
//!
//! Each dynamic attribute is its own binding: a change to one attribute's
//! inputs re-evaluates only that attribute.

use std::collections::HashSet;

use crate::engine::OutputKind;
use crate::pipeline::{AttrBinding, CompiledElement, ElementKind, mount_node};
use crate::state::Scope;
use crate::types::Value;

use super::types::{Cleanup, Runtime};

/// Mount an element or component under the current parent.
///
/// Returns a cleanup function that unmounts children (in reverse order),
/// stops the attribute bindings and releases the node.
pub fn element(el: &CompiledElement, scope: &Scope, rt: &Runtime) -> Cleanup {
    let kind = match &el.kind {
        ElementKind::Element(Some(tag)) => OutputKind::Element(tag.clone()),
        ElementKind::Element(None) => OutputKind::Fragment,
        ElementKind::Component(name) => OutputKind::Component(name.clone()),
    };
    let tree = rt.tree.clone();
    let index = tree.allocate(kind, el.section.as_deref());
    tracing::trace!(index, location = %el.location, "mount element");

    let mut cleanups: Vec<Cleanup> = Vec::new();

    if let Some(bind) = &el.bind {
        let explicit: HashSet<String> = el.attrs.iter().map(|(name, _)| name.clone()).collect();
        let bind = bind.clone();
        let scope = scope.clone();
        let rt_inner = rt.clone();
        let location = format!("{}.bind", el.location);
        let mut previous: Vec<String> = Vec::new();

        cleanups.push(rt.bind(move || {
            let Some(value) = rt_inner.evaluate(&bind, &scope, &location) else {
                return;
            };
            let spread = match value {
                Value::Object(map) => map,
                Value::Undefined | Value::Null => Default::default(),
                other => {
                    rt_inner.report(
                        crate::pipeline::DiagnosticKind::Runtime,
                        &location,
                        &format!("`bind` expects an object, got {}", other.type_name()),
                    );
                    return;
                }
            };

            for stale in previous.iter().filter(|key| !spread.contains_key(*key)) {
                rt_inner.tree.set_attr(index, stale, Value::Undefined);
            }
            previous = spread
                .keys()
                .filter(|key| !explicit.contains(*key))
                .cloned()
                .collect();
            for (key, value) in spread {
                if !explicit.contains(&key) {
                    rt_inner.tree.set_attr(index, &key, value);
                }
            }
        }));
    }

    for (name, binding) in &el.attrs {
        match binding {
            AttrBinding::Static(value) => {
                tree.set_attr(index, name, value.clone());
            }
            AttrBinding::Dynamic(expr) => {
                let expr = expr.clone();
                let name = name.clone();
                let scope = scope.clone();
                let rt_inner = rt.clone();
                let location = format!("{}.attrs.{name}", el.location);
                cleanups.push(rt.bind(move || {
                    if let Some(value) = rt_inner.evaluate(&expr, &scope, &location) {
                        rt_inner.tree.set_attr(index, &name, value);
                    }
                }));
            }
        }
    }

    tree.with_parent(index, || {
        for child in &el.children {
            cleanups.push(mount_node(child, scope, rt));
        }
    });

    Box::new(move || {
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        tree.release(index);
    })
}
