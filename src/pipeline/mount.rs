//! Mount API - Interpreter entry point and mounted-tree lifecycle.
//!
//! # Example
//!
//! ```ignore
//! use spark_schema::{Interpreter, NodeContext, SchemaNode, Slots};
//!
//! let schema = SchemaNode::from_json_str(r#"{ "$el": "label", "children": "$label" }"#)?;
//! let ctx = NodeContext::new().with_prop("label", "Name");
//!
//! let handle = Interpreter::new().mount(&schema, &ctx, Slots::new())?;
//! ctx.set_prop("label", "Full Name"); // only the text node is patched
//!
//! handle.unmount();
//! ```

use std::sync::Arc;

use crate::engine::{OutputKind, OutputTree, RenderedNode};
use crate::error::SchemaError;
use crate::expression::ExpressionCache;
use crate::primitives::{Cleanup, Runtime, Slots, each, element, show, slot, text};
use crate::state::{NodeContext, Scope};
use crate::types::SchemaNode;

use super::compile::{CompiledNode, compile_schema};
use super::diagnostics::Diagnostics;
use super::options::InterpreterOptions;

// =============================================================================
// Dispatch
// =============================================================================

/// Mount a compiled node under the current parent of `rt.tree`.
pub fn mount_node(node: &CompiledNode, scope: &Scope, rt: &Runtime) -> Cleanup {
    match node {
        CompiledNode::Text { text: content, location } => text(content, scope, rt, location),
        CompiledNode::Element(el) => element(el, scope, rt),
        CompiledNode::Conditional(cond) => show(cond, scope, rt),
        CompiledNode::Loop(lp) => each(lp, scope, rt),
        CompiledNode::Slot(guard) => slot(guard, scope, rt),
        CompiledNode::Fragment(items) => {
            let cleanups: Vec<Cleanup> = items.iter().map(|item| mount_node(item, scope, rt)).collect();
            Box::new(move || {
                for cleanup in cleanups.into_iter().rev() {
                    cleanup();
                }
            })
        }
    }
}

// =============================================================================
// Mount Handle
// =============================================================================

/// Handle returned by [`Interpreter::mount`].
///
/// Unmounting (explicitly or on drop) stops every binding synchronously and
/// releases every output node.
pub struct MountHandle {
    cleanup: Option<Cleanup>,
    root: usize,
    runtime: Runtime,
}

impl MountHandle {
    /// Stop all bindings and release the output tree.
    pub fn unmount(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            tracing::debug!(root = self.root, "unmount");
            cleanup();
            self.runtime.tree.release(self.root);
        }
    }

    /// Index of the root fragment everything is mounted beneath.
    pub fn root(&self) -> usize {
        self.root
    }

    pub fn tree(&self) -> &OutputTree {
        &self.runtime.tree
    }

    /// The rendered output, fragments flattened.
    pub fn snapshot(&self) -> Vec<RenderedNode> {
        self.runtime.tree.snapshot_node(self.root)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    /// Output index of the first node mounted from section `name`.
    pub fn find_section(&self, name: &str) -> Option<usize> {
        self.runtime.tree.find_section(name)
    }

    /// Live subscriptions: one per dynamic attribute, text, condition, loop
    /// and slot currently mounted.
    pub fn active_bindings(&self) -> usize {
        self.runtime.active_bindings()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.runtime.diagnostics
    }

    pub fn is_mounted(&self) -> bool {
        self.cleanup.is_some()
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountHandle")
            .field("root", &self.root)
            .field("mounted", &self.is_mounted())
            .field("runtime", &self.runtime)
            .finish()
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// Compiles schemas and mounts them against node contexts.
///
/// The expression cache is shared by every schema this interpreter
/// compiles, and may be shared with other interpreters.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    cache: Arc<ExpressionCache>,
    options: InterpreterOptions,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: Arc<ExpressionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_options(mut self, options: InterpreterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &Arc<ExpressionCache> {
        &self.cache
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Parse every expression in `schema`.
    pub fn compile(&self, schema: &SchemaNode) -> Result<CompiledNode, SchemaError> {
        compile_schema(schema, &self.cache)
    }

    /// Compile and mount `schema`.
    ///
    /// Parse errors abort before anything is mounted. Evaluation errors do
    /// not: they are reported through [`MountHandle::diagnostics`].
    pub fn mount(
        &self,
        schema: &SchemaNode,
        ctx: &NodeContext,
        slots: Slots,
    ) -> Result<MountHandle, SchemaError> {
        let compiled = self.compile(schema)?;
        Ok(self.mount_compiled(&compiled, ctx, slots))
    }

    /// Mount an already compiled schema. One compiled tree can be mounted
    /// any number of times.
    pub fn mount_compiled(&self, compiled: &CompiledNode, ctx: &NodeContext, slots: Slots) -> MountHandle {
        let diagnostics = if self.options.report_errors_once {
            Diagnostics::new()
        } else {
            Diagnostics::repeating()
        };
        let runtime = Runtime::new(
            OutputTree::new(),
            diagnostics.clone(),
            self.options.clone(),
            self.cache.clone(),
        );
        let scope = Scope::new(ctx.clone(), slots, diagnostics);

        let root = runtime.tree.allocate(OutputKind::Fragment, None);
        let cleanup = runtime
            .tree
            .with_parent(root, || mount_node(compiled, &scope, &runtime));

        if self.options.flush_on_mount {
            spark_signals::flush_sync();
        }
        tracing::debug!(
            root,
            nodes = runtime.tree.allocated_count(),
            bindings = runtime.active_bindings(),
            "mounted schema"
        );

        MountHandle {
            cleanup: Some(cleanup),
            root,
            runtime,
        }
    }
}

/// Mount `schema` with a default [`Interpreter`].
pub fn mount(schema: &SchemaNode, ctx: &NodeContext, slots: Slots) -> Result<MountHandle, SchemaError> {
    Interpreter::new().mount(schema, ctx, slots)
}

/// Unmount and clean up.
pub fn unmount(handle: MountHandle) {
    handle.unmount();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(value: serde_json::Value) -> SchemaNode {
        SchemaNode::from_json(value).unwrap()
    }

    #[test]
    fn test_static_tree() {
        let handle = mount(
            &schema(json!({ "$el": "div", "attrs": { "id": "x" }, "children": ["hi", { "$el": "br" }] })),
            &NodeContext::new(),
            Slots::new(),
        )
        .unwrap();

        assert_eq!(
            handle.to_json(),
            json!([{ "$el": "div", "attrs": { "id": "x" }, "children": ["hi", { "$el": "br" }] }])
        );
        assert_eq!(handle.active_bindings(), 0);
    }

    #[test]
    fn test_unmount_releases_everything() {
        let ctx = NodeContext::new().with_prop("label", "Name");
        let handle = mount(
            &schema(json!({ "$el": "label", "attrs": { "title": "$label" }, "children": "$label" })),
            &ctx,
            Slots::new(),
        )
        .unwrap();
        let tree = handle.tree().clone();
        assert_eq!(handle.active_bindings(), 2);

        handle.unmount();
        assert_eq!(tree.allocated_count(), 0);

        // No binding may fire after unmount
        ctx.set_prop("label", "changed");
        assert_eq!(tree.allocated_count(), 0);
    }

    #[test]
    fn test_drop_unmounts() {
        let tree = {
            let handle = mount(&schema(json!("$value")), &NodeContext::new(), Slots::new()).unwrap();
            handle.tree().clone()
        };
        assert_eq!(tree.allocated_count(), 0);
    }

    #[test]
    fn test_parse_error_aborts_mount() {
        let result = mount(&schema(json!({ "$el": "p", "children": "$a +" })), &NodeContext::new(), Slots::new());
        assert!(matches!(result, Err(SchemaError::Expression { .. })));
    }
}
