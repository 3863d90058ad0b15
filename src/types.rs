//! Core types for spark-schema.
//!
//! These types define the foundation that everything builds on:
//! - [`Value`] is what expressions produce and scope frames hold.
//! - [`SchemaNode`] is the serialisable tree that sections build and the
//!   interpreter mounts.
//!
//! Schema nodes are a closed sum type decided at parse time. A slot-guard is
//! its own [`SchemaNode::Slot`] variant, so a user-authored `if/then/else` is
//! never mistaken for one.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Attribute (or component prop) map. Insertion order is preserved.
pub type AttrMap = IndexMap<String, Value>;

// =============================================================================
// Value
// =============================================================================

/// Dynamic value flowing through scopes and expressions.
///
/// `Undefined` and `Null` are distinct: `Undefined` is what a missing key or
/// an unresolved function yields, `Null` is an explicit JSON null.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Truthiness used by conditions, `&&` and `||`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// True for `Undefined` and `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Numeric coercion. `None` means "not a number".
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Undefined => None,
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(*n),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Some(0.0)
                } else {
                    trimmed.parse::<f64>().ok()
                }
            }
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Text as it appears in rendered output. Nullish values render empty.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => self.to_json().to_string(),
        }
    }

    /// Stable identity string, used to key loop items by value.
    pub fn identity_key(&self) -> String {
        match self {
            Value::Undefined => "u:".to_string(),
            Value::Null => "n:".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Number(n) => format!("d:{}", format_number(*n)),
            Value::String(s) => format!("s:{s}"),
            Value::Array(_) | Value::Object(_) => format!("j:{}", self.to_json()),
        }
    }

    /// Member access for a single path segment.
    ///
    /// Objects are indexed by key, arrays by numeric segment. `length` is
    /// available on arrays and strings. Anything else yields `Undefined`.
    pub fn get(&self, segment: &str) -> Value {
        match self {
            Value::Object(map) => map.get(segment).cloned().unwrap_or_default(),
            Value::Array(items) => {
                if segment == "length" {
                    return Value::Number(items.len() as f64);
                }
                segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
            Value::String(s) if segment == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }
    }

    /// Follow a member path.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Value {
        match path.split_first() {
            None => self.clone(),
            Some((first, rest)) => self.get(first.as_ref()).get_path(rest),
        }
    }

    /// Convert to a `serde_json::Value`. `Undefined` becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

/// Format a number the way rendered text expects: integers without a
/// fractional part, non-finite values by name.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.0e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

// =============================================================================
// Output patch flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// What a patch touched on an output node since the flags were last taken.
    ///
    /// Combine with bitwise OR: `Dirty::ATTRS | Dirty::TEXT`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Dirty: u8 {
        const NONE = 0;
        const TAG = 1 << 0;
        const ATTRS = 1 << 1;
        const TEXT = 1 << 2;
        const CHILDREN = 1 << 3;
    }
}

// =============================================================================
// Schema nodes
// =============================================================================

/// A node of the schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Plain text, or an expression when it starts with `$`.
    Text(String),
    Element(ElementNode),
    Component(ComponentNode),
    Conditional(ConditionalNode),
    /// Slot-guard: render the embedder's slot for `name` if present, else `default`.
    Slot(SlotNode),
    /// A schema array, rendered in order without a wrapper.
    Fragment(Vec<SchemaNode>),
}

/// Children of an element or component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Children {
    Nodes(Vec<SchemaNode>),
    /// A single expression rendered as text.
    Expression(String),
}

/// Section metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Meta {
    pub fn is_empty(&self) -> bool {
        self.section.is_none() && self.extra.is_empty()
    }
}

/// An HTML-like element. A `None` tag unwraps: children render in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementNode {
    #[serde(rename = "$el")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: AttrMap,
    /// Expression evaluating to an object spread into the attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Children>,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<ForDirective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ElementNode {
    pub fn new(tag: Option<&str>) -> Self {
        Self {
            tag: tag.map(str::to_owned),
            ..Default::default()
        }
    }
}

/// A host-framework component, resolved by name outside this crate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentNode {
    #[serde(rename = "$cmp")]
    pub component: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub props: AttrMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Children>,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<ForDirective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalNode {
    #[serde(rename = "if")]
    pub condition: String,
    pub then: Box<SchemaNode>,
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Box<SchemaNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotNode {
    #[serde(rename = "$slot")]
    pub name: String,
    pub default: Box<SchemaNode>,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<ForDirective>,
}

/// `for: [item, index?, source]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForDirective {
    pub item: String,
    pub index: Option<String>,
    /// Expression producing the collection.
    pub source: String,
}

impl ForDirective {
    pub fn new(item: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            index: None,
            source: source.into(),
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }
}

impl Serialize for ForDirective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.index.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.item)?;
        if let Some(index) = &self.index {
            seq.serialize_element(index)?;
        }
        seq.serialize_element(&self.source)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ForDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = Vec::<String>::deserialize(deserializer)?;
        let mut parts = parts.into_iter();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(item), Some(source), None, None) => Ok(ForDirective::new(item, source)),
            (Some(item), Some(index), Some(source), None) => {
                Ok(ForDirective::new(item, source).with_index(index))
            }
            _ => Err(de::Error::custom(
                "`for` expects [item, source] or [item, index, source]",
            )),
        }
    }
}

impl SchemaNode {
    pub fn text(text: impl Into<String>) -> Self {
        SchemaNode::Text(text.into())
    }

    pub fn element(tag: &str) -> Self {
        SchemaNode::Element(ElementNode::new(Some(tag)))
    }

    /// An empty fragment: renders nothing.
    pub fn empty() -> Self {
        SchemaNode::Fragment(Vec::new())
    }

    /// `meta.section` of an element or component.
    pub fn section_name(&self) -> Option<&str> {
        self.meta().and_then(|m| m.section.as_deref())
    }

    pub fn meta(&self) -> Option<&Meta> {
        match self {
            SchemaNode::Element(el) => Some(&el.meta),
            SchemaNode::Component(cmp) => Some(&cmp.meta),
            _ => None,
        }
    }

    pub fn meta_mut(&mut self) -> Option<&mut Meta> {
        match self {
            SchemaNode::Element(el) => Some(&mut el.meta),
            SchemaNode::Component(cmp) => Some(&mut cmp.meta),
            _ => None,
        }
    }

    /// True for nodes carrying an element or component discriminator.
    pub fn is_structured(&self) -> bool {
        matches!(self, SchemaNode::Element(_) | SchemaNode::Component(_))
    }

    /// Child nodes of an element or component, when given as a node list.
    pub fn child_nodes(&self) -> &[SchemaNode] {
        let children = match self {
            SchemaNode::Element(el) => el.children.as_ref(),
            SchemaNode::Component(cmp) => cmp.children.as_ref(),
            _ => None,
        };
        match children {
            Some(Children::Nodes(nodes)) => nodes,
            _ => &[],
        }
    }

    /// Parse a node from a JSON value.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SchemaError> {
        match value {
            serde_json::Value::String(s) => Ok(SchemaNode::Text(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(SchemaNode::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(SchemaNode::Fragment),
            serde_json::Value::Null => Ok(SchemaNode::empty()),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
                Ok(SchemaNode::Text(value.to_string()))
            }
            serde_json::Value::Object(map) => {
                if map.contains_key("$el") {
                    from_object(map).map(SchemaNode::Element)
                } else if map.contains_key("$cmp") {
                    from_object(map).map(SchemaNode::Component)
                } else if map.contains_key("$slot") {
                    from_object(map).map(SchemaNode::Slot)
                } else if map.contains_key("if") && map.contains_key("then") {
                    from_object(map).map(SchemaNode::Conditional)
                } else {
                    let keys: Vec<_> = map.keys().cloned().collect();
                    Err(SchemaError::InvalidNode(format!(
                        "object with keys {keys:?} has no `$el`, `$cmp`, `$slot` or `if`/`then`"
                    )))
                }
            }
        }
    }

    pub fn from_json_str(source: &str) -> Result<Self, SchemaError> {
        let value: serde_json::Value = serde_json::from_str(source)?;
        SchemaNode::from_json(value)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, SchemaError> {
        Ok(serde_json::to_value(self)?)
    }
}

fn from_object<T: DeserializeOwned>(
    map: serde_json::Map<String, serde_json::Value>,
) -> Result<T, SchemaError> {
    Ok(serde_json::from_value(serde_json::Value::Object(map))?)
}

impl From<&str> for SchemaNode {
    fn from(text: &str) -> Self {
        SchemaNode::Text(text.to_string())
    }
}

impl From<ElementNode> for SchemaNode {
    fn from(el: ElementNode) -> Self {
        SchemaNode::Element(el)
    }
}

impl From<ComponentNode> for SchemaNode {
    fn from(cmp: ComponentNode) -> Self {
        SchemaNode::Component(cmp)
    }
}

impl Serialize for SchemaNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SchemaNode::Text(text) => serializer.serialize_str(text),
            SchemaNode::Element(el) => el.serialize(serializer),
            SchemaNode::Component(cmp) => cmp.serialize(serializer),
            SchemaNode::Conditional(cond) => cond.serialize(serializer),
            SchemaNode::Slot(slot) => slot.serialize(serializer),
            SchemaNode::Fragment(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SchemaNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        SchemaNode::from_json(raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_display_numbers() {
        assert_eq!(Value::from(10).to_display_string(), "10");
        assert_eq!(Value::from(2.5).to_display_string(), "2.5");
        assert_eq!(Value::Undefined.to_display_string(), "");
    }

    #[test]
    fn test_get_path() {
        let value = Value::from(json!({ "user": { "tags": ["a", "b"] } }));
        assert_eq!(value.get_path(&["user", "tags", "1"]), Value::from("b"));
        assert_eq!(value.get_path(&["user", "tags", "length"]), Value::from(2));
        assert_eq!(value.get_path(&["user", "missing", "deeper"]), Value::Undefined);
    }

    #[test]
    fn test_node_discrimination() {
        let node = SchemaNode::from_json(json!([
            "hello",
            { "$el": "div", "attrs": { "id": "x" } },
            { "$el": null, "children": "$label" },
            { "$cmp": "Icon", "props": { "name": "check" } },
            { "if": "$show", "then": "yes", "else": "no" },
            { "$slot": "label", "default": { "$el": "label" } },
        ]))
        .unwrap();

        let SchemaNode::Fragment(items) = node else {
            panic!("expected fragment");
        };
        assert!(matches!(items[0], SchemaNode::Text(_)));
        assert!(matches!(&items[1], SchemaNode::Element(el) if el.tag.as_deref() == Some("div")));
        assert!(matches!(&items[2], SchemaNode::Element(el) if el.tag.is_none()));
        assert!(matches!(items[3], SchemaNode::Component(_)));
        assert!(matches!(items[4], SchemaNode::Conditional(_)));
        assert!(matches!(items[5], SchemaNode::Slot(_)));
    }

    #[test]
    fn test_json_round_trip_keeps_unwrap_tag() {
        let source = json!({
            "$el": null,
            "children": [{ "$el": "span", "for": ["item", "i", "$items"], "key": "$item.id" }],
            "meta": { "section": "wrapper" }
        });
        let node = SchemaNode::from_json(source.clone()).unwrap();
        assert_eq!(node.section_name(), Some("wrapper"));
        assert_eq!(node.to_json().unwrap(), source);
    }

    #[test]
    fn test_unknown_object_is_rejected() {
        let err = SchemaNode::from_json(json!({ "tag": "div" })).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidNode(_)));
    }

    #[test]
    fn test_bad_for_directive() {
        let err = SchemaNode::from_json(json!({ "$el": "li", "for": ["only"] }));
        assert!(err.is_err());
    }
}
