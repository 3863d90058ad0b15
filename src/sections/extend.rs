//! Extension merger.
//!
//! Rules, checked in order:
//! 1. Text base: a text extension or a structured patch (one naming `$el` or
//!    `$cmp`) replaces it. Anything else leaves it unchanged.
//! 2. Fragment base: only a structured patch replaces it. Fragments are
//!    never merged into.
//! 3. Otherwise: `null` removes the node, text replaces it, and a patch is
//!    merged. Object-valued keys (`attrs`, `props`, `meta`, nested attribute
//!    objects) merge key by key, every other key present in the patch
//!    overwrites. A `null` inside an object deletes that key; an absent key
//!    keeps the base value.
//!
//! Slot-guards are transparent: extensions apply to the guarded default.

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::types::{
    AttrMap, Children, ComponentNode, ConditionalNode, ElementNode, ForDirective, Meta, SchemaNode,
    Value,
};

/// Caller override for one section.
#[derive(Debug, Clone, PartialEq)]
pub enum Extension {
    /// `null`: render nothing for this section.
    Remove,
    /// A string: replace the node with text (or an expression).
    Text(String),
    /// An object: merge into the node.
    Node(NodePatch),
}

impl From<&str> for Extension {
    fn from(text: &str) -> Self {
        Extension::Text(text.to_string())
    }
}

impl From<String> for Extension {
    fn from(text: String) -> Self {
        Extension::Text(text)
    }
}

impl From<NodePatch> for Extension {
    fn from(patch: NodePatch) -> Self {
        Extension::Node(patch)
    }
}

impl Extension {
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

impl Serialize for Extension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Extension::Remove => serializer.serialize_unit(),
            Extension::Text(text) => serializer.serialize_str(text),
            Extension::Node(patch) => patch.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Extension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Ok(Extension::Remove),
            serde_json::Value::String(text) => Ok(Extension::Text(text)),
            object @ serde_json::Value::Object(_) => serde_json::from_value(object)
                .map(Extension::Node)
                .map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "an extension must be null, a string or an object, got {other}"
            ))),
        }
    }
}

/// Present-but-null deserializes to `Some(None)`, absent to `None`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial node. `None` fields leave the base untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodePatch {
    /// `Some(None)` unwraps the element.
    #[serde(rename = "$el", default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub tag: Option<Option<String>>,
    #[serde(rename = "$cmp", default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<IndexMap<String, Value>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub bind: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub children: Option<Option<Children>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<IndexMap<String, Value>>,
    #[serde(rename = "if", default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub condition: Option<Option<String>>,
    #[serde(rename = "for", default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Option<ForDirective>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub key: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<SchemaNode>>,
    #[serde(rename = "else", default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Option<Box<SchemaNode>>>,
}

impl NodePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(Some(tag.to_string()));
        self
    }

    /// Clear the tag so the children render in place.
    pub fn unwrap(mut self) -> Self {
        self.tag = Some(None);
        self
    }

    pub fn component(mut self, name: &str) -> Self {
        self.component = Some(name.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attrs
            .get_or_insert_with(IndexMap::new)
            .insert(name.to_string(), value.into());
        self
    }

    /// Delete an attribute from the base.
    pub fn remove_attr(mut self, name: &str) -> Self {
        self.attrs
            .get_or_insert_with(IndexMap::new)
            .insert(name.to_string(), Value::Null);
        self
    }

    pub fn prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.props
            .get_or_insert_with(IndexMap::new)
            .insert(name.to_string(), value.into());
        self
    }

    pub fn children(mut self, children: Vec<SchemaNode>) -> Self {
        self.children = Some(Some(Children::Nodes(children)));
        self
    }

    pub fn text(mut self, expression: &str) -> Self {
        self.children = Some(Some(Children::Expression(expression.to_string())));
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.condition = Some(Some(condition.to_string()));
        self
    }

    pub fn repeat(mut self, directive: ForDirective) -> Self {
        self.repeat = Some(Some(directive));
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta
            .get_or_insert_with(IndexMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Names an element or component, and so can stand alone as a node.
    pub fn is_structured(&self) -> bool {
        self.tag.is_some() || self.component.is_some()
    }

    /// Build a fresh node from this patch alone.
    pub fn into_node(self) -> SchemaNode {
        match self.component.clone() {
            Some(component) => {
                let base = ComponentNode {
                    component,
                    ..Default::default()
                };
                SchemaNode::Component(apply_to_component(base, self))
            }
            None => SchemaNode::Element(apply_to_element(ElementNode::default(), self)),
        }
    }
}

/// Apply `extension` to `base`, following the rules in the module docs.
pub fn extend_schema(base: SchemaNode, extension: &Extension) -> SchemaNode {
    match (base, extension) {
        (SchemaNode::Slot(mut guard), extension) => {
            let mut extension = extension.clone();
            if let Extension::Node(patch) = &mut extension {
                // `for` belongs to the guard so each item picks slot or default
                if let Some(repeat) = patch.repeat.take() {
                    guard.repeat = repeat;
                }
            }
            let default = std::mem::replace(&mut *guard.default, SchemaNode::empty());
            *guard.default = extend_schema(default, &extension);
            SchemaNode::Slot(guard)
        }

        // Rule 1: text leaves
        (SchemaNode::Text(_), Extension::Text(text)) => SchemaNode::Text(text.clone()),
        (SchemaNode::Text(_), Extension::Node(patch)) if patch.is_structured() => {
            patch.clone().into_node()
        }
        (base @ SchemaNode::Text(_), _) => base,

        // Rule 2: fragments are opaque
        (SchemaNode::Fragment(_), Extension::Node(patch)) if patch.is_structured() => {
            patch.clone().into_node()
        }
        (base @ SchemaNode::Fragment(_), _) => base,

        // Rule 3: merge
        (_, Extension::Remove) => SchemaNode::empty(),
        (_, Extension::Text(text)) => SchemaNode::Text(text.clone()),
        (SchemaNode::Element(el), Extension::Node(patch)) => {
            if patch.component.is_some() {
                replace_kind(el.meta, patch.clone())
            } else {
                SchemaNode::Element(apply_to_element(el, patch.clone()))
            }
        }
        (SchemaNode::Component(cmp), Extension::Node(patch)) => {
            if matches!(patch.tag, Some(Some(_))) {
                replace_kind(cmp.meta, patch.clone())
            } else {
                SchemaNode::Component(apply_to_component(cmp, patch.clone()))
            }
        }
        (SchemaNode::Conditional(cond), Extension::Node(patch)) => {
            if patch.is_structured() {
                patch.clone().into_node()
            } else {
                SchemaNode::Conditional(apply_to_conditional(cond, patch.clone()))
            }
        }
    }
}

/// A patch that switches element to component (or back) replaces the node,
/// keeping only the section name.
fn replace_kind(base_meta: Meta, patch: NodePatch) -> SchemaNode {
    let mut node = patch.into_node();
    match node.meta_mut() {
        Some(meta) if meta.section.is_none() => meta.section = base_meta.section,
        _ => {}
    }
    node
}

/// Deep-merge `extension` into `base`. Objects merge per key, `null` deletes.
pub fn merge_value(base: Option<Value>, extension: Value) -> Option<Value> {
    match (base, extension) {
        (_, Value::Null) => None,
        (Some(Value::Object(mut base)), Value::Object(extension)) => {
            merge_map(&mut base, extension);
            Some(Value::Object(base))
        }
        (_, extension) => Some(extension),
    }
}

fn merge_map(base: &mut AttrMap, extension: IndexMap<String, Value>) {
    for (key, value) in extension {
        let current = base.get(&key).cloned();
        match merge_value(current, value) {
            Some(merged) => {
                base.insert(key, merged);
            }
            None => {
                base.shift_remove(&key);
            }
        }
    }
}

fn merge_meta(meta: &mut Meta, patch: IndexMap<String, Value>) {
    for (key, value) in patch {
        if key == "section" {
            meta.section = value.as_str().map(str::to_owned);
            continue;
        }
        let current = meta.extra.get(&key).cloned();
        match merge_value(current, value) {
            Some(merged) => {
                meta.extra.insert(key, merged);
            }
            None => {
                meta.extra.shift_remove(&key);
            }
        }
    }
}

fn apply_to_element(mut el: ElementNode, patch: NodePatch) -> ElementNode {
    if let Some(tag) = patch.tag {
        el.tag = tag;
    }
    if let Some(attrs) = patch.attrs {
        merge_map(&mut el.attrs, attrs);
    }
    if let Some(bind) = patch.bind {
        el.bind = bind;
    }
    if let Some(children) = patch.children {
        el.children = children;
    }
    if let Some(meta) = patch.meta {
        merge_meta(&mut el.meta, meta);
    }
    if let Some(condition) = patch.condition {
        el.condition = condition;
    }
    if let Some(repeat) = patch.repeat {
        el.repeat = repeat;
    }
    if let Some(key) = patch.key {
        el.key = key;
    }
    el
}

fn apply_to_component(mut cmp: ComponentNode, patch: NodePatch) -> ComponentNode {
    if let Some(component) = patch.component {
        cmp.component = component;
    }
    // `attrs` on a component patch are treated as props
    for props in [patch.attrs, patch.props].into_iter().flatten() {
        merge_map(&mut cmp.props, props);
    }
    if let Some(children) = patch.children {
        cmp.children = children;
    }
    if let Some(meta) = patch.meta {
        merge_meta(&mut cmp.meta, meta);
    }
    if let Some(condition) = patch.condition {
        cmp.condition = condition;
    }
    if let Some(repeat) = patch.repeat {
        cmp.repeat = repeat;
    }
    if let Some(key) = patch.key {
        cmp.key = key;
    }
    cmp
}

fn apply_to_conditional(mut cond: ConditionalNode, patch: NodePatch) -> ConditionalNode {
    if let Some(Some(condition)) = patch.condition {
        cond.condition = condition;
    }
    if let Some(then) = patch.then {
        cond.then = then;
    }
    if let Some(otherwise) = patch.otherwise {
        cond.otherwise = otherwise;
    }
    cond
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> SchemaNode {
        SchemaNode::from_json(value).unwrap()
    }

    fn ext(value: serde_json::Value) -> Extension {
        Extension::from_json(value).unwrap()
    }

    #[test]
    fn test_attrs_merge_and_extension_wins() {
        let out = extend_schema(
            node(json!({ "$el": "div", "attrs": { "class": "a", "id": "x" } })),
            &ext(json!({ "attrs": { "class": "b" } })),
        );
        assert_eq!(out.to_json().unwrap(), json!({ "$el": "div", "attrs": { "class": "b", "id": "x" } }));
    }

    #[test]
    fn test_text_base() {
        assert_eq!(extend_schema(SchemaNode::text("text"), &"other".into()), SchemaNode::text("other"));
        assert_eq!(
            extend_schema(SchemaNode::text("text"), &ext(json!({ "attrs": { "a": 1 } }))),
            SchemaNode::text("text"),
            "a non-structured patch cannot override a text leaf"
        );
        assert_eq!(
            extend_schema(SchemaNode::text("text"), &Extension::Remove),
            SchemaNode::text("text")
        );
        assert_eq!(
            extend_schema(SchemaNode::text("text"), &ext(json!({ "$el": "b" }))),
            SchemaNode::element("b")
        );
    }

    #[test]
    fn test_fragment_base_is_replaced_not_merged() {
        let out = extend_schema(node(json!(["x"])), &ext(json!({ "$el": "div" })));
        assert_eq!(out, SchemaNode::element("div"));

        let out = extend_schema(node(json!(["x"])), &ext(json!({ "attrs": { "a": 1 } })));
        assert_eq!(out, node(json!(["x"])));
    }

    #[test]
    fn test_null_deletes_absent_keeps() {
        let out = extend_schema(
            node(json!({ "$el": "input", "attrs": { "type": "text", "disabled": true, "style": { "color": "red", "margin": 0 } } })),
            &ext(json!({ "attrs": { "disabled": null, "style": { "margin": null, "padding": 2 } } })),
        );
        assert_eq!(
            out.to_json().unwrap(),
            json!({ "$el": "input", "attrs": { "type": "text", "style": { "color": "red", "padding": 2 } } })
        );
    }

    #[test]
    fn test_remove_and_unwrap() {
        let base = node(json!({ "$el": "div", "children": ["a"], "meta": { "section": "wrapper" } }));
        assert_eq!(extend_schema(base.clone(), &Extension::Remove), SchemaNode::empty());

        let out = extend_schema(base, &ext(json!({ "$el": null })));
        assert_eq!(
            out.to_json().unwrap(),
            json!({ "$el": null, "children": ["a"], "meta": { "section": "wrapper" } })
        );
    }

    #[test]
    fn test_kind_change_replaces_but_keeps_section() {
        let base = node(json!({ "$el": "span", "attrs": { "class": "x" }, "meta": { "section": "icon" } }));
        let out = extend_schema(base, &ext(json!({ "$cmp": "Icon", "props": { "name": "check" } })));
        assert_eq!(
            out.to_json().unwrap(),
            json!({ "$cmp": "Icon", "props": { "name": "check" }, "meta": { "section": "icon" } })
        );
    }

    #[test]
    fn test_slot_guard_is_transparent() {
        let base = node(json!({ "$slot": "label", "default": { "$el": "label", "meta": { "section": "label" } } }));
        let out = extend_schema(base, &ext(json!({ "attrs": { "for": "$id" }, "for": ["x", "$xs"] })));
        let SchemaNode::Slot(guard) = out else {
            panic!("guard must survive");
        };
        assert_eq!(guard.repeat, Some(ForDirective::new("x", "$xs")));
        assert!(matches!(&*guard.default, SchemaNode::Element(el) if el.attrs.contains_key("for") && el.repeat.is_none()));
    }

    #[test]
    fn test_unknown_patch_key_is_rejected() {
        assert!(Extension::from_json(json!({ "atrs": {} })).is_err());
        assert!(Extension::from_json(json!([1])).is_err());
    }
}
