//! Primitive types - cleanup, slots and the mount runtime.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use spark_signals::{effect, effect_root};

use crate::engine::OutputTree;
use crate::error::EvalError;
use crate::expression::{CompiledExpression, ExpressionCache};
use crate::pipeline::{DiagnosticKind, Diagnostics, InterpreterOptions};
use crate::state::Scope;
use crate::types::{SchemaNode, Value};

// =============================================================================
// Cleanup Function
// =============================================================================

/// Cleanup function returned by every mount primitive.
///
/// Call this to unmount the node: it stops the node's bindings and releases
/// its output indices, synchronously.
pub type Cleanup = Box<dyn FnOnce()>;

/// Run `mount` under its own reactive root.
///
/// Effects created while another effect runs are destroyed on that effect's
/// next run. A root is skipped by that teardown, so the bindings `mount`
/// creates stay live until the returned cleanup runs.
pub fn mount_owned(mount: impl FnOnce() -> Cleanup + 'static) -> Cleanup {
    let mounted: Rc<RefCell<Option<Cleanup>>> = Rc::new(RefCell::new(None));
    let mounted_in_root = mounted.clone();
    let stop_root = effect_root(move || {
        *mounted_in_root.borrow_mut() = Some(mount());
    });
    Box::new(move || {
        let cleanup = mounted.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        stop_root();
    })
}

// =============================================================================
// Slots
// =============================================================================

/// Loop-scoped arguments passed to a slot rendered inside a `for`.
pub type SlotProps = IndexMap<String, Value>;

/// Slot render callback.
///
/// Using `Rc<dyn Fn>` lets one callback be shared by every loop item that
/// renders it.
pub type SlotFn = Rc<dyn Fn(&SlotProps) -> SchemaNode>;

/// Embedder-supplied content keyed by section name.
#[derive(Clone, Default)]
pub struct Slots {
    slots: Rc<IndexMap<String, SlotFn>>,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slot rendered by `f`.
    pub fn with(mut self, name: &str, f: impl Fn(&SlotProps) -> SchemaNode + 'static) -> Self {
        Rc::make_mut(&mut self.slots).insert(name.to_string(), Rc::new(f));
        self
    }

    /// Add a slot that always renders `node`.
    pub fn with_node(self, name: &str, node: SchemaNode) -> Self {
        self.with(name, move |_| node.clone())
    }

    pub fn get(&self, name: &str) -> Option<SlotFn> {
        self.slots.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for Slots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// Everything a mount primitive needs besides its node and scope.
#[derive(Clone)]
pub struct Runtime {
    pub tree: OutputTree,
    pub diagnostics: Diagnostics,
    pub options: InterpreterOptions,
    pub cache: Arc<ExpressionCache>,
    bindings: Rc<Cell<usize>>,
}

impl Runtime {
    pub fn new(
        tree: OutputTree,
        diagnostics: Diagnostics,
        options: InterpreterOptions,
        cache: Arc<ExpressionCache>,
    ) -> Self {
        Self {
            tree,
            diagnostics,
            options,
            cache,
            bindings: Rc::new(Cell::new(0)),
        }
    }

    /// Create a binding: an effect that re-runs whenever a signal it read
    /// changes. The returned cleanup stops it.
    pub fn bind(&self, f: impl FnMut() + 'static) -> Cleanup {
        let release = self.track_binding();
        let stop = effect(f);
        Box::new(move || {
            stop();
            release();
        })
    }

    /// Count a subscription owned elsewhere. Call the returned function when
    /// it is released.
    pub fn track_binding(&self) -> impl FnOnce() + 'static {
        let bindings = self.bindings.clone();
        bindings.set(bindings.get() + 1);
        move || bindings.set(bindings.get().saturating_sub(1))
    }

    /// Live subscriptions across the mounted tree.
    pub fn active_bindings(&self) -> usize {
        self.bindings.get()
    }

    /// Evaluate, reporting failures. `None` means keep the last good output.
    pub fn evaluate(
        &self,
        expr: &CompiledExpression,
        scope: &Scope,
        location: &str,
    ) -> Option<Value> {
        match expr.evaluate(scope) {
            Ok(value) => Some(value),
            Err(err) => {
                self.report_error(location, &err);
                None
            }
        }
    }

    pub fn report_error(&self, location: &str, err: &EvalError) {
        self.report(DiagnosticKind::Runtime, location, &err.to_string());
    }

    pub fn report(&self, kind: DiagnosticKind, location: &str, message: &str) {
        self.diagnostics.report(kind, location, message);
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("tree", &self.tree)
            .field("options", &self.options)
            .field("bindings", &self.bindings.get())
            .finish()
    }
}
