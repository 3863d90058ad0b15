//! Schema compilation.
//!
//! Turns a [`SchemaNode`] tree into a [`CompiledNode`] tree: every embedded
//! expression is parsed (through the shared cache) up front, so a bad
//! expression aborts assembly instead of surfacing at render time.
//!
//! Directive nesting, outermost first:
//!
//! ```text
//! for  ->  if  ->  node
//! ```
//!
//! so a node's `if` is evaluated per loop item.

use std::rc::Rc;

use crate::error::SchemaError;
use crate::expression::{CompiledExpression, ExpressionCache, is_expression, unescape};
use crate::types::{AttrMap, Children, ForDirective, SchemaNode, Value};

#[derive(Debug, Clone)]
pub enum CompiledText {
    Static(String),
    Dynamic(CompiledExpression),
}

#[derive(Debug, Clone)]
pub enum AttrBinding {
    Static(Value),
    Dynamic(CompiledExpression),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// `None` unwraps: children render in place.
    Element(Option<String>),
    Component(String),
}

#[derive(Debug)]
pub struct CompiledElement {
    pub kind: ElementKind,
    pub attrs: Vec<(String, AttrBinding)>,
    /// Object spread into the attributes; explicit attributes win.
    pub bind: Option<CompiledExpression>,
    pub children: Vec<CompiledNode>,
    pub section: Option<String>,
    pub location: String,
}

#[derive(Debug)]
pub struct CompiledConditional {
    pub condition: CompiledExpression,
    pub then: CompiledNode,
    pub otherwise: Option<CompiledNode>,
    pub location: String,
}

#[derive(Debug)]
pub struct CompiledLoop {
    pub item: String,
    pub index: Option<String>,
    pub source: CompiledExpression,
    pub key: Option<CompiledExpression>,
    pub body: CompiledNode,
    pub location: String,
}

#[derive(Debug)]
pub struct CompiledSlot {
    pub name: String,
    pub default: CompiledNode,
    pub location: String,
}

#[derive(Debug, Clone)]
pub enum CompiledNode {
    Text {
        text: CompiledText,
        location: Rc<str>,
    },
    Element(Rc<CompiledElement>),
    Conditional(Rc<CompiledConditional>),
    Loop(Rc<CompiledLoop>),
    Slot(Rc<CompiledSlot>),
    Fragment(Rc<[CompiledNode]>),
}

/// Compile a schema, parsing each expression through `cache`.
pub fn compile_schema(
    schema: &SchemaNode,
    cache: &ExpressionCache,
) -> Result<CompiledNode, SchemaError> {
    Compiler { cache }.node(schema, "")
}

struct Compiler<'a> {
    cache: &'a ExpressionCache,
}

fn join(parent: &str, label: &str) -> String {
    if parent.is_empty() {
        label.to_string()
    } else {
        format!("{parent}/{label}")
    }
}

impl Compiler<'_> {
    fn expression(&self, source: &str, location: &str) -> Result<CompiledExpression, SchemaError> {
        self.cache
            .compile(source)
            .map_err(|err| SchemaError::expression(location, err))
    }

    fn text(&self, text: &str, location: &str) -> Result<CompiledText, SchemaError> {
        if is_expression(text) {
            Ok(CompiledText::Dynamic(self.expression(text, location)?))
        } else {
            Ok(CompiledText::Static(unescape(text).to_string()))
        }
    }

    fn node(&self, node: &SchemaNode, location: &str) -> Result<CompiledNode, SchemaError> {
        match node {
            SchemaNode::Text(text) => Ok(CompiledNode::Text {
                text: self.text(text, location)?,
                location: Rc::from(location),
            }),
            SchemaNode::Fragment(items) => self.fragment(items, location),
            SchemaNode::Element(el) => {
                let label = el
                    .meta
                    .section
                    .clone()
                    .unwrap_or_else(|| join(location, el.tag.as_deref().unwrap_or("$el")));
                let element = self.element(
                    ElementKind::Element(el.tag.clone()),
                    &el.attrs,
                    el.bind.as_deref(),
                    el.children.as_ref(),
                    el.meta.section.clone(),
                    &label,
                )?;
                self.directives(element, el.condition.as_deref(), el.repeat.as_ref(), el.key.as_deref(), &label)
            }
            SchemaNode::Component(cmp) => {
                let label = cmp
                    .meta
                    .section
                    .clone()
                    .unwrap_or_else(|| join(location, &cmp.component));
                let element = self.element(
                    ElementKind::Component(cmp.component.clone()),
                    &cmp.props,
                    None,
                    cmp.children.as_ref(),
                    cmp.meta.section.clone(),
                    &label,
                )?;
                self.directives(element, cmp.condition.as_deref(), cmp.repeat.as_ref(), cmp.key.as_deref(), &label)
            }
            SchemaNode::Conditional(cond) => {
                let at = join(location, "if");
                Ok(CompiledNode::Conditional(Rc::new(CompiledConditional {
                    condition: self.expression(&cond.condition, &at)?,
                    then: self.node(&cond.then, &join(&at, "then"))?,
                    otherwise: cond
                        .otherwise
                        .as_deref()
                        .map(|node| self.node(node, &join(&at, "else")))
                        .transpose()?,
                    location: at,
                })))
            }
            SchemaNode::Slot(slot) => {
                let compiled = CompiledNode::Slot(Rc::new(CompiledSlot {
                    name: slot.name.clone(),
                    default: self.node(&slot.default, location)?,
                    location: join(location, &format!("$slots.{}", slot.name)),
                }));
                self.directives(compiled, None, slot.repeat.as_ref(), None, &slot.name)
            }
        }
    }

    fn fragment(&self, items: &[SchemaNode], location: &str) -> Result<CompiledNode, SchemaError> {
        let children = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.node(item, &join(location, &i.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledNode::Fragment(children.into()))
    }

    fn element(
        &self,
        kind: ElementKind,
        attrs: &AttrMap,
        bind: Option<&str>,
        children: Option<&Children>,
        section: Option<String>,
        location: &str,
    ) -> Result<CompiledNode, SchemaError> {
        let attrs = attrs
            .iter()
            .map(|(name, value)| {
                let binding = match value {
                    Value::String(s) if is_expression(s) => {
                        AttrBinding::Dynamic(self.expression(s, &format!("{location}.attrs.{name}"))?)
                    }
                    Value::String(s) => AttrBinding::Static(Value::String(unescape(s).to_string())),
                    other => AttrBinding::Static(other.clone()),
                };
                Ok((name.clone(), binding))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let bind = bind
            .map(|source| self.expression(source, &format!("{location}.bind")))
            .transpose()?;

        let children = match children {
            None => Vec::new(),
            Some(Children::Expression(text)) => {
                let at = format!("{location}.children");
                vec![CompiledNode::Text {
                    text: self.text(text, &at)?,
                    location: Rc::from(at.as_str()),
                }]
            }
            Some(Children::Nodes(nodes)) => nodes
                .iter()
                .enumerate()
                .map(|(i, child)| self.node(child, &join(location, &i.to_string())))
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(CompiledNode::Element(Rc::new(CompiledElement {
            kind,
            attrs,
            bind,
            children,
            section,
            location: location.to_string(),
        })))
    }

    /// Wrap a compiled node in its `if` and `for` directives.
    fn directives(
        &self,
        node: CompiledNode,
        condition: Option<&str>,
        repeat: Option<&ForDirective>,
        key: Option<&str>,
        location: &str,
    ) -> Result<CompiledNode, SchemaError> {
        let node = match condition {
            Some(condition) => {
                let at = format!("{location}.if");
                CompiledNode::Conditional(Rc::new(CompiledConditional {
                    condition: self.expression(condition, &at)?,
                    then: node,
                    otherwise: None,
                    location: at,
                }))
            }
            None => node,
        };

        let Some(repeat) = repeat else {
            if key.is_some() {
                tracing::debug!(location, "`key` without `for` is ignored");
            }
            return Ok(node);
        };

        if repeat.item.is_empty() || repeat.index.as_deref() == Some("") {
            return Err(SchemaError::InvalidFor(format!(
                "{location}: loop variable names cannot be empty"
            )));
        }

        let at = format!("{location}.for");
        // Loop sources are always expressions, `$` or not: `3` iterates 0..3.
        let source = self.expression(&repeat.source, &at)?;

        Ok(CompiledNode::Loop(Rc::new(CompiledLoop {
            item: repeat.item.trim_start_matches('$').to_string(),
            index: repeat
                .index
                .as_deref()
                .map(|index| index.trim_start_matches('$').to_string()),
            source,
            key: key
                .map(|key| self.expression(key, &format!("{location}.key")))
                .transpose()?,
            body: node,
            location: at,
        })))
    }
}

impl CompiledNode {
    /// Number of expressions compiled into this tree.
    pub fn expression_count(&self) -> usize {
        match self {
            CompiledNode::Text { text, .. } => matches!(text, CompiledText::Dynamic(_)) as usize,
            CompiledNode::Element(el) => {
                el.attrs
                    .iter()
                    .filter(|(_, b)| matches!(b, AttrBinding::Dynamic(_)))
                    .count()
                    + el.bind.is_some() as usize
                    + el.children.iter().map(CompiledNode::expression_count).sum::<usize>()
            }
            CompiledNode::Conditional(cond) => {
                1 + cond.then.expression_count()
                    + cond.otherwise.as_ref().map_or(0, CompiledNode::expression_count)
            }
            CompiledNode::Loop(lp) => 1 + lp.key.is_some() as usize + lp.body.expression_count(),
            CompiledNode::Slot(slot) => slot.default.expression_count(),
            CompiledNode::Fragment(items) => items.iter().map(CompiledNode::expression_count).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(schema: serde_json::Value) -> Result<CompiledNode, SchemaError> {
        let cache = ExpressionCache::new();
        compile_schema(&SchemaNode::from_json(schema).unwrap(), &cache)
    }

    #[test]
    fn test_for_wraps_if() {
        let node = compile(json!({
            "$el": "li",
            "if": "$item.visible",
            "for": ["item", "$items"],
            "children": "$item.name"
        }))
        .unwrap();

        let CompiledNode::Loop(lp) = node else {
            panic!("expected loop outermost");
        };
        assert_eq!(lp.item, "item");
        assert!(matches!(lp.body, CompiledNode::Conditional(_)));
    }

    #[test]
    fn test_parse_error_reports_location() {
        let err = compile(json!({
            "$el": "label",
            "attrs": { "class": "$a +" },
            "meta": { "section": "label" }
        }))
        .unwrap_err();

        match err {
            SchemaError::Expression { location, .. } => assert_eq!(location, "label.attrs.class"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_literal_text_is_not_parsed() {
        let node = compile(json!(["plain + text", "\\$5", "$price"])).unwrap();
        let CompiledNode::Fragment(items) = node else {
            panic!("expected fragment");
        };
        assert!(matches!(&items[0], CompiledNode::Text { text: CompiledText::Static(s), .. } if s == "plain + text"));
        assert!(matches!(&items[1], CompiledNode::Text { text: CompiledText::Static(s), .. } if s == "$5"));
        assert!(matches!(&items[2], CompiledNode::Text { text: CompiledText::Dynamic(_), .. }));
    }

    #[test]
    fn test_expression_count() {
        let node = compile(json!({
            "$el": "input",
            "attrs": { "type": "text", "value": "$value", "id": "$id" },
            "bind": "$attrs"
        }))
        .unwrap();
        assert_eq!(node.expression_count(), 3);
    }
}
