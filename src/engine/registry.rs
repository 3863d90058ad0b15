//! Output Registry - Index allocation for rendered nodes.
//!
//! Manages the lifecycle of output node indices:
//! - Free index pool for O(1) reuse
//! - Parent context stack for nested node creation
//! - Destroy callbacks per index
//! - Per-node patch version and dirty flags
//!
//! The registry is an explicit handle rather than ambient state, so two
//! mounted schemas never share indices and tests start from a clean tree.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;

use crate::types::{AttrMap, Dirty, Value};

// =============================================================================
// Node Data
// =============================================================================

/// What an output node renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    Element(String),
    Component(String),
    Text,
    /// Renders only its children. Used for unwrapped sections and for the
    /// anchors of conditionals, loops and slots.
    Fragment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputNode {
    pub kind: OutputKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Attributes for elements, props for components.
    pub attrs: AttrMap,
    pub text: String,
    /// `meta.section` of the schema node this was mounted from.
    pub section: Option<String>,
    /// Bumped on every patch that changes this node.
    pub version: u64,
    pub dirty: Dirty,
}

impl OutputNode {
    fn new(kind: OutputKind, parent: Option<usize>, section: Option<String>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            attrs: AttrMap::new(),
            text: String::new(),
            section,
            version: 0,
            dirty: Dirty::TAG,
        }
    }

    fn touch(&mut self, flag: Dirty) {
        self.version += 1;
        self.dirty |= flag;
    }
}

/// Flattened rendered output: fragments are spliced into their parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderedNode {
    Element {
        #[serde(rename = "$el")]
        tag: String,
        #[serde(skip_serializing_if = "AttrMap::is_empty")]
        attrs: AttrMap,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        children: Vec<RenderedNode>,
    },
    Component {
        #[serde(rename = "$cmp")]
        component: String,
        #[serde(skip_serializing_if = "AttrMap::is_empty")]
        props: AttrMap,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        children: Vec<RenderedNode>,
    },
    Text(String),
}

// =============================================================================
// Registry State
// =============================================================================

type DestroyCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct TreeState {
    /// Slot per index. `None` marks a free index.
    nodes: Vec<Option<OutputNode>>,
    /// Pool of freed indices for reuse.
    free: Vec<usize>,
    /// Top-level nodes in mount order.
    roots: Vec<usize>,
    /// Stack of parent indices for nested node creation.
    parent_stack: Vec<usize>,
    /// Destroy callbacks registered per index.
    destroy_callbacks: HashMap<usize, Vec<DestroyCallback>>,
}

impl TreeState {
    fn node(&self, index: usize) -> Option<&OutputNode> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut OutputNode> {
        self.nodes.get_mut(index).and_then(Option::as_mut)
    }
}

/// Shared handle to a tree of rendered output nodes.
#[derive(Clone, Default)]
pub struct OutputTree {
    state: Rc<RefCell<TreeState>>,
}

impl OutputTree {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Parent Context Stack
    // =========================================================================

    /// Current parent index (`None` at the root).
    pub fn current_parent(&self) -> Option<usize> {
        self.state.borrow().parent_stack.last().copied()
    }

    pub fn push_parent(&self, index: usize) {
        self.state.borrow_mut().parent_stack.push(index);
    }

    pub fn pop_parent(&self) {
        self.state.borrow_mut().parent_stack.pop();
    }

    /// Run `f` with `index` as the current parent.
    pub fn with_parent<R>(&self, index: usize, f: impl FnOnce() -> R) -> R {
        self.push_parent(index);
        let result = f();
        self.pop_parent();
        result
    }

    // =========================================================================
    // Index Allocation
    // =========================================================================

    /// Allocate a node and append it to the current parent (or the roots).
    pub fn allocate(&self, kind: OutputKind, section: Option<&str>) -> usize {
        let mut state = self.state.borrow_mut();
        let parent = state.parent_stack.last().copied();
        let node = OutputNode::new(kind, parent, section.map(str::to_owned));

        let index = match state.free.pop() {
            Some(index) => {
                state.nodes[index] = Some(node);
                index
            }
            None => {
                state.nodes.push(Some(node));
                state.nodes.len() - 1
            }
        };

        match parent {
            Some(parent) => {
                if let Some(parent) = state.node_mut(parent) {
                    parent.children.push(index);
                    parent.touch(Dirty::CHILDREN);
                }
            }
            None => state.roots.push(index),
        }

        tracing::trace!(index, ?parent, "allocated output node");
        index
    }

    /// Release an index back to the pool.
    ///
    /// Also recursively releases all children. Destroy callbacks run after
    /// the children are gone and before the index is reused.
    pub fn release(&self, index: usize) {
        let children = match self.state.borrow().node(index) {
            Some(node) => node.children.clone(),
            None => return,
        };

        for child in children {
            self.release(child);
        }

        self.run_destroy_callbacks(index);

        let mut state = self.state.borrow_mut();
        let Some(node) = state.nodes.get_mut(index).and_then(Option::take) else {
            return;
        };
        match node.parent {
            Some(parent) => {
                if let Some(parent) = state.node_mut(parent) {
                    parent.children.retain(|&child| child != index);
                    parent.touch(Dirty::CHILDREN);
                }
            }
            None => state.roots.retain(|&root| root != index),
        }
        state.free.push(index);

        // When everything is released, start over from index 0
        if state.roots.is_empty() && state.nodes.iter().all(Option::is_none) {
            state.nodes.clear();
            state.free.clear();
        }
        tracing::trace!(index, "released output node");
    }

    // =========================================================================
    // Destroy Callbacks
    // =========================================================================

    /// Register a callback to run when the node at `index` is released.
    pub fn on_destroy(&self, index: usize, callback: impl FnOnce() + 'static) {
        self.state
            .borrow_mut()
            .destroy_callbacks
            .entry(index)
            .or_default()
            .push(Box::new(callback));
    }

    fn run_destroy_callbacks(&self, index: usize) {
        let callbacks = self.state.borrow_mut().destroy_callbacks.remove(&index);
        for callback in callbacks.into_iter().flatten() {
            callback();
        }
    }

    // =========================================================================
    // Patches
    // =========================================================================

    /// Set (or, with `Value::Undefined`, remove) an attribute.
    ///
    /// Returns `true` if the node changed.
    pub fn set_attr(&self, index: usize, name: &str, value: Value) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(node) = state.node_mut(index) else {
            return false;
        };
        let changed = if value == Value::Undefined {
            node.attrs.shift_remove(name).is_some()
        } else if node.attrs.get(name) != Some(&value) {
            node.attrs.insert(name.to_string(), value);
            true
        } else {
            false
        };
        if changed {
            node.touch(Dirty::ATTRS);
        }
        changed
    }

    pub fn set_text(&self, index: usize, text: &str) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(node) = state.node_mut(index) else {
            return false;
        };
        if node.text == text {
            return false;
        }
        node.text = text.to_string();
        node.touch(Dirty::TEXT);
        true
    }

    /// Reorder the children of `index`. `order` must be a permutation of the
    /// current children.
    pub fn reorder_children(&self, index: usize, order: Vec<usize>) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(node) = state.node_mut(index) else {
            return false;
        };
        if node.children == order {
            return false;
        }
        debug_assert_eq!(node.children.len(), order.len());
        node.children = order;
        node.touch(Dirty::CHILDREN);
        true
    }

    /// Take and clear the dirty flags of one node.
    pub fn take_dirty(&self, index: usize) -> Dirty {
        self.state
            .borrow_mut()
            .node_mut(index)
            .map(|node| std::mem::take(&mut node.dirty))
            .unwrap_or_default()
    }

    /// Clear dirty flags on every node.
    pub fn clear_dirty(&self) {
        for node in self.state.borrow_mut().nodes.iter_mut().flatten() {
            node.dirty = Dirty::NONE;
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn get(&self, index: usize) -> Option<OutputNode> {
        self.state.borrow().node(index).cloned()
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        self.state.borrow().node(index).is_some()
    }

    pub fn allocated_count(&self) -> usize {
        self.state.borrow().nodes.iter().flatten().count()
    }

    pub fn version(&self, index: usize) -> Option<u64> {
        self.state.borrow().node(index).map(|node| node.version)
    }

    pub fn children(&self, index: usize) -> Vec<usize> {
        self.state
            .borrow()
            .node(index)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn roots(&self) -> Vec<usize> {
        self.state.borrow().roots.clone()
    }

    /// First node, in document order, mounted from section `name`.
    pub fn find_section(&self, name: &str) -> Option<usize> {
        let state = self.state.borrow();
        let mut stack: Vec<usize> = state.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let Some(node) = state.node(index) else {
                continue;
            };
            if node.section.as_deref() == Some(name) {
                return Some(index);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Concatenated text of all text nodes under `index`.
    pub fn text_content(&self, index: usize) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        collect_text(&state, index, &mut out);
        out
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// The whole rendered tree, fragments flattened.
    pub fn snapshot(&self) -> Vec<RenderedNode> {
        let state = self.state.borrow();
        let mut out = Vec::new();
        for &root in &state.roots {
            render_into(&state, root, &mut out);
        }
        out
    }

    /// Rendered output of a single node (several nodes if it is a fragment).
    pub fn snapshot_node(&self, index: usize) -> Vec<RenderedNode> {
        let state = self.state.borrow();
        let mut out = Vec::new();
        render_into(&state, index, &mut out);
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    /// Drop all nodes without running destroy callbacks (for testing).
    pub fn reset(&self) {
        *self.state.borrow_mut() = TreeState::default();
    }
}

impl std::fmt::Debug for OutputTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputTree")
            .field("allocated", &self.allocated_count())
            .finish()
    }
}

fn collect_text(state: &TreeState, index: usize, out: &mut String) {
    let Some(node) = state.node(index) else {
        return;
    };
    if node.kind == OutputKind::Text {
        out.push_str(&node.text);
    }
    for &child in &node.children {
        collect_text(state, child, out);
    }
}

fn render_into(state: &TreeState, index: usize, out: &mut Vec<RenderedNode>) {
    let Some(node) = state.node(index) else {
        return;
    };
    let render_children = || {
        let mut children = Vec::new();
        for &child in &node.children {
            render_into(state, child, &mut children);
        }
        children
    };
    match &node.kind {
        OutputKind::Text => out.push(RenderedNode::Text(node.text.clone())),
        OutputKind::Fragment => out.extend(render_children()),
        OutputKind::Element(tag) => out.push(RenderedNode::Element {
            tag: tag.clone(),
            attrs: node.attrs.clone(),
            children: render_children(),
        }),
        OutputKind::Component(component) => out.push(RenderedNode::Component {
            component: component.clone(),
            props: node.attrs.clone(),
            children: render_children(),
        }),
    }
}
