//! Section algebra: `$if`, `$for`, `$attrs`, `$extend` and `$root`.
//!
//! Each function takes sections and returns a new one. Inputs are never
//! modified, so one section can appear in several compositions.

use std::sync::Once;

use crate::types::{AttrMap, Children, ConditionalNode, ElementNode, ForDirective, SchemaNode, Value};

use super::extend::{Extension, extend_schema};
use super::{ExtensionMap, Section};

/// `$if`: render `then` when `condition` is truthy, else `otherwise`.
pub fn if_section(condition: &str, then: impl Into<Section>, otherwise: Option<Section>) -> Section {
    let condition = condition.to_string();
    let then = then.into();
    Section::new(None, move |extensions| {
        SchemaNode::Conditional(ConditionalNode {
            condition: condition.clone(),
            then: Box::new(then.build(extensions)),
            otherwise: otherwise.as_ref().map(|section| Box::new(section.build(extensions))),
        })
    })
}

/// `$for`: repeat `section` once per item of `source`.
pub fn for_section(item: &str, source: &str, section: impl Into<Section>) -> Section {
    repeat(ForDirective::new(item, source), section.into())
}

/// `$for` with an index variable.
pub fn for_section_indexed(item: &str, index: &str, source: &str, section: impl Into<Section>) -> Section {
    repeat(ForDirective::new(item, source).with_index(index), section.into())
}

fn repeat(directive: ForDirective, section: Section) -> Section {
    let name = section.name.clone();
    Section::new(None, move |extensions| attach_for(section.build(extensions), directive.clone()))
        .renamed(name)
}

/// A slot-guard takes the directive itself so every iteration picks slot or
/// default. Nodes that cannot carry one are wrapped in an unwrapped element.
fn attach_for(node: SchemaNode, directive: ForDirective) -> SchemaNode {
    match node {
        SchemaNode::Slot(mut guard) => {
            guard.repeat = Some(directive);
            SchemaNode::Slot(guard)
        }
        SchemaNode::Element(mut el) => {
            el.repeat = Some(directive);
            SchemaNode::Element(el)
        }
        SchemaNode::Component(mut cmp) => {
            cmp.repeat = Some(directive);
            SchemaNode::Component(cmp)
        }
        other => {
            let mut wrapper = ElementNode::new(None);
            wrapper.children = Some(Children::Nodes(vec![other]));
            wrapper.repeat = Some(directive);
            SchemaNode::Element(wrapper)
        }
    }
}

/// `$attrs`: shallow-merge `attrs` into the section's root. Applied after
/// the caller's extension, so these keys win.
pub fn attrs_section<I, K, V>(attrs: I, section: impl Into<Section>) -> Section
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let attrs: AttrMap = attrs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    let section = section.into();
    let name = section.name.clone();
    Section::new(None, move |extensions| apply_attrs(section.build(extensions), &attrs))
        .renamed(name)
}

fn apply_attrs(node: SchemaNode, attrs: &AttrMap) -> SchemaNode {
    match node {
        SchemaNode::Slot(mut guard) => {
            let default = std::mem::replace(&mut *guard.default, SchemaNode::empty());
            *guard.default = apply_attrs(default, attrs);
            SchemaNode::Slot(guard)
        }
        SchemaNode::Element(mut el) => {
            el.attrs.extend(attrs.clone());
            SchemaNode::Element(el)
        }
        SchemaNode::Component(mut cmp) => {
            cmp.props.extend(attrs.clone());
            SchemaNode::Component(cmp)
        }
        other => other,
    }
}

/// `$extend`: apply a fixed partial to the section, then the caller's
/// extension for the same name on top.
pub fn extend_section(section: impl Into<Section>, partial: impl Into<Extension>) -> Section {
    let section = section.into();
    let partial = partial.into();
    let name = section.name.clone();

    Section::new(None, move |extensions| match section.name() {
        Some(name) => {
            let node = extend_schema(section.build(&extensions.without(name)), &partial);
            match extensions.get(name) {
                Some(extension) => extend_schema(node, extension),
                None => node,
            }
        }
        None => extend_schema(section.build(extensions), &partial),
    })
    .renamed(name)
}

static ROOT_DEPRECATION: Once = Once::new();

/// `$root`: lift a section into a top-level schema array.
#[deprecated(note = "build the section directly; schemas no longer need a root array")]
pub fn root_section(section: impl Into<Section>) -> Section {
    ROOT_DEPRECATION.call_once(|| {
        tracing::warn!("$root is deprecated: build the section directly");
    });
    let section = section.into();
    let name = section.name.clone();
    Section::new(None, move |extensions: &ExtensionMap| {
        SchemaNode::Fragment(vec![section.build(extensions)])
    })
    .renamed(name)
}
