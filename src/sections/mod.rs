//! Sections - Named, overridable pieces of schema.
//!
//! A section is a function from an [`ExtensionMap`] to a [`SchemaNode`].
//! Building the same section twice with equal extensions yields equal
//! schemas; nothing is shared or mutated between builds.
//!
//! ```ignore
//! let outer = create_section("outer", "div");
//! let label = create_section("label", "label");
//! let input = create_section("input", "input");
//!
//! let schema = outer.with([label.with(["$label"]), input.leaf()]);
//! let node = schema.build(&ExtensionMap::new().with("label", NodePatch::new().tag("span")));
//! ```
//!
//! Every built section is wrapped in a slot-guard named after it, so an
//! embedder-supplied slot always takes precedence over the markup.

pub mod compose;
pub mod extend;
pub mod traverse;

use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{Children, ElementNode, SchemaNode, SlotNode, Value};

pub use compose::{attrs_section, extend_section, for_section, for_section_indexed, if_section};
#[allow(deprecated)]
pub use compose::root_section;
pub use extend::{Extension, NodePatch, extend_schema, merge_value};
pub use traverse::{SectionMatch, each_section, find_section, find_section_mut};

// =============================================================================
// Extension map
// =============================================================================

/// Overrides keyed by section name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionMap(IndexMap<String, Extension>);

impl ExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, section: &str, extension: impl Into<Extension>) -> Self {
        self.0.insert(section.to_string(), extension.into());
        self
    }

    /// Remove `section` entirely.
    pub fn remove(self, section: &str) -> Self {
        self.with(section, Extension::Remove)
    }

    pub fn insert(&mut self, section: &str, extension: impl Into<Extension>) {
        self.0.insert(section.to_string(), extension.into());
    }

    pub fn get(&self, section: &str) -> Option<&Extension> {
        self.0.get(section)
    }

    /// A copy without the entry for `section`.
    pub fn without(&self, section: &str) -> Self {
        let mut map = self.0.clone();
        map.shift_remove(section);
        Self(map)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

// =============================================================================
// Section
// =============================================================================

type BuildFn = Rc<dyn Fn(&ExtensionMap) -> SchemaNode>;

/// A buildable piece of schema.
#[derive(Clone)]
pub struct Section {
    name: Option<Rc<str>>,
    build: BuildFn,
}

impl Section {
    pub fn new(name: Option<&str>, build: impl Fn(&ExtensionMap) -> SchemaNode + 'static) -> Self {
        Self {
            name: name.map(Rc::from),
            build: Rc::new(build),
        }
    }

    /// A constant node that ignores extensions.
    pub fn literal(node: impl Into<SchemaNode>) -> Self {
        let node = node.into();
        Self::new(None, move |_| node.clone())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn build(&self, extensions: &ExtensionMap) -> SchemaNode {
        (self.build)(extensions)
    }

    /// Build without extensions.
    pub fn build_default(&self) -> SchemaNode {
        self.build(&ExtensionMap::new())
    }

    pub(crate) fn renamed(self, name: Option<Rc<str>>) -> Self {
        Self { name, ..self }
    }
}

impl std::fmt::Debug for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Section").field("name", &self.name).finish_non_exhaustive()
    }
}

impl From<&str> for Section {
    fn from(text: &str) -> Self {
        Section::literal(SchemaNode::text(text))
    }
}

impl From<String> for Section {
    fn from(text: String) -> Self {
        Section::literal(SchemaNode::Text(text))
    }
}

impl From<SchemaNode> for Section {
    fn from(node: SchemaNode) -> Self {
        Section::literal(node)
    }
}

impl From<&SectionFactory> for Section {
    fn from(factory: &SectionFactory) -> Self {
        factory.leaf()
    }
}

// =============================================================================
// create_section
// =============================================================================

/// What a section renders as.
#[derive(Clone)]
pub enum SectionEl {
    Tag(String),
    /// No wrapper element: children render in place.
    Unwrap,
    /// Build the base node by hand.
    Builder(Rc<dyn Fn() -> SchemaNode>),
}

impl SectionEl {
    pub fn builder(build: impl Fn() -> SchemaNode + 'static) -> Self {
        SectionEl::Builder(Rc::new(build))
    }

    fn base(&self) -> SchemaNode {
        match self {
            SectionEl::Tag(tag) => SchemaNode::element(tag),
            SectionEl::Unwrap => SchemaNode::Element(ElementNode::new(None)),
            SectionEl::Builder(build) => build(),
        }
    }
}

impl std::fmt::Debug for SectionEl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionEl::Tag(tag) => f.debug_tuple("Tag").field(tag).finish(),
            SectionEl::Unwrap => f.write_str("Unwrap"),
            SectionEl::Builder(_) => f.write_str("Builder(..)"),
        }
    }
}

impl From<&str> for SectionEl {
    fn from(tag: &str) -> Self {
        SectionEl::Tag(tag.to_string())
    }
}

impl From<Option<&str>> for SectionEl {
    fn from(tag: Option<&str>) -> Self {
        tag.map_or(SectionEl::Unwrap, SectionEl::from)
    }
}

/// Returned by [`create_section`]: supply children to get a [`Section`].
#[derive(Debug, Clone)]
pub struct SectionFactory {
    name: Rc<str>,
    el: SectionEl,
}

/// Define a named section.
pub fn create_section(name: &str, el: impl Into<SectionEl>) -> SectionFactory {
    SectionFactory {
        name: Rc::from(name),
        el: el.into(),
    }
}

impl SectionFactory {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A section with no children.
    pub fn leaf(&self) -> Section {
        self.with(Vec::<Section>::new())
    }

    /// A section with the given children.
    ///
    /// Children only fill a base that has none of its own. The built node is
    /// tagged with `meta.section`, gets `class: "$classes.<name>"` unless the
    /// base sets a class, then has the caller's extension for this name
    /// applied, and is finally wrapped in the `<name>` slot-guard.
    pub fn with<I, S>(&self, children: I) -> Section
    where
        I: IntoIterator<Item = S>,
        S: Into<Section>,
    {
        let children: Vec<Section> = children.into_iter().map(Into::into).collect();
        let name = self.name.clone();
        let el = self.el.clone();

        Section::new(Some(&*self.name), move |extensions| {
            let mut node = el.base();
            if let Some(meta) = node.meta_mut() {
                meta.section = Some(name.to_string());
            }

            if !children.is_empty() {
                let built = || children.iter().map(|child| child.build(extensions)).collect();
                match &mut node {
                    SchemaNode::Element(el) if el.children.is_none() => {
                        el.children = Some(Children::Nodes(built()));
                    }
                    SchemaNode::Component(cmp) if cmp.children.is_none() => {
                        cmp.children = Some(Children::Nodes(built()));
                    }
                    _ => {}
                }
            }

            match &mut node {
                SchemaNode::Element(el) if el.tag.is_some() && !el.attrs.contains_key("class") => {
                    el.attrs.shift_insert(
                        0,
                        "class".to_string(),
                        Value::String(format!("$classes.{name}")),
                    );
                }
                _ => {}
            }

            let node = match extensions.get(&name) {
                Some(extension) => extend_schema(node, extension),
                None => node,
            };

            SchemaNode::Slot(SlotNode {
                name: name.to_string(),
                default: Box::new(node),
                repeat: None,
            })
        })
    }
}
