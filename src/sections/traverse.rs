//! Lookups over built schemas.

use std::ops::ControlFlow;

use crate::types::{Children, SchemaNode, SlotNode};

/// A section located by [`find_section`].
#[derive(Debug, Clone, Copy)]
pub struct SectionMatch<'a> {
    /// Element or component whose children hold the section, `None` at the top.
    pub parent: Option<&'a SchemaNode>,
    /// The slot-guard wrapping the section, when it has one.
    pub guard: Option<&'a SlotNode>,
    /// The section's own node (the guard's default).
    pub node: &'a SchemaNode,
}

fn child_list(node: &SchemaNode) -> Option<&[SchemaNode]> {
    let children = match node {
        SchemaNode::Element(el) => el.children.as_ref(),
        SchemaNode::Component(cmp) => cmp.children.as_ref(),
        _ => None,
    };
    match children {
        Some(Children::Nodes(nodes)) => Some(nodes),
        _ => None,
    }
}

/// Depth-first search for the first section named `name`.
///
/// Slot content is never consulted: only the schema's own markup is searched.
pub fn find_section<'a>(schema: &'a SchemaNode, name: &str) -> Option<SectionMatch<'a>> {
    find_in(schema, None, name)
}

fn find_in<'a>(node: &'a SchemaNode, parent: Option<&'a SchemaNode>, name: &str) -> Option<SectionMatch<'a>> {
    match node {
        SchemaNode::Slot(guard) if guard.name == name => Some(SectionMatch {
            parent,
            guard: Some(guard),
            node: &guard.default,
        }),
        SchemaNode::Slot(guard) => find_in(&guard.default, parent, name),
        SchemaNode::Element(_) | SchemaNode::Component(_) => {
            if node.section_name() == Some(name) {
                return Some(SectionMatch {
                    parent,
                    guard: None,
                    node,
                });
            }
            child_list(node)?
                .iter()
                .find_map(|child| find_in(child, Some(node), name))
        }
        SchemaNode::Conditional(cond) => find_in(&cond.then, parent, name)
            .or_else(|| cond.otherwise.as_deref().and_then(|other| find_in(other, parent, name))),
        SchemaNode::Fragment(items) => items.iter().find_map(|item| find_in(item, parent, name)),
        SchemaNode::Text(_) => None,
    }
}

fn matches_section(node: &SchemaNode, name: &str) -> bool {
    match node {
        SchemaNode::Slot(guard) => guard.name == name,
        other => other.section_name() == Some(name),
    }
}

/// Mutable [`find_section`]: returns the section's own node so it can be
/// edited in place. The slot-guard, if any, stays around it.
pub fn find_section_mut<'a>(node: &'a mut SchemaNode, name: &str) -> Option<&'a mut SchemaNode> {
    if matches_section(node, name) {
        return Some(match node {
            SchemaNode::Slot(guard) => &mut *guard.default,
            other => other,
        });
    }
    match node {
        SchemaNode::Slot(guard) => find_section_mut(&mut guard.default, name),
        SchemaNode::Element(el) => match &mut el.children {
            Some(Children::Nodes(nodes)) => nodes.iter_mut().find_map(|child| find_section_mut(child, name)),
            _ => None,
        },
        SchemaNode::Component(cmp) => match &mut cmp.children {
            Some(Children::Nodes(nodes)) => nodes.iter_mut().find_map(|child| find_section_mut(child, name)),
            _ => None,
        },
        SchemaNode::Conditional(cond) => find_section_mut(&mut cond.then, name).or_else(|| {
            cond.otherwise
                .as_deref_mut()
                .and_then(|other| find_section_mut(other, name))
        }),
        SchemaNode::Fragment(items) => items.iter_mut().find_map(|item| find_section_mut(item, name)),
        SchemaNode::Text(_) => None,
    }
}

/// Visit every section in pre-order.
///
/// With `stop` set, traversal ends as soon as `visitor` returns `true`.
/// Returns whether it ended early.
pub fn each_section<F>(schema: &SchemaNode, mut visitor: F, stop: bool) -> bool
where
    F: FnMut(&SchemaNode) -> bool,
{
    walk(schema, &mut visitor, stop).is_break()
}

fn walk<F>(node: &SchemaNode, visitor: &mut F, stop: bool) -> ControlFlow<()>
where
    F: FnMut(&SchemaNode) -> bool,
{
    match node {
        SchemaNode::Slot(guard) => {
            // A guard around a section that carries no meta of its own counts once
            if guard.default.section_name().is_none() && visitor(node) && stop {
                return ControlFlow::Break(());
            }
            walk(&guard.default, visitor, stop)
        }
        SchemaNode::Element(_) | SchemaNode::Component(_) => {
            if node.section_name().is_some() && visitor(node) && stop {
                return ControlFlow::Break(());
            }
            for child in node.child_nodes() {
                walk(child, visitor, stop)?;
            }
            ControlFlow::Continue(())
        }
        SchemaNode::Conditional(cond) => {
            walk(&cond.then, visitor, stop)?;
            match &cond.otherwise {
                Some(other) => walk(other, visitor, stop),
                None => ControlFlow::Continue(()),
            }
        }
        SchemaNode::Fragment(items) => {
            for item in items {
                walk(item, visitor, stop)?;
            }
            ControlFlow::Continue(())
        }
        SchemaNode::Text(_) => ControlFlow::Continue(()),
    }
}
