//! Node context - the data source a schema is mounted against.
//!
//! Holds the node's `value`, a flat map of `props`, an `attrs` passthrough,
//! the `fns` namespace, lazily computed `classes` and an event emitter.
//! Every readable piece is a signal, so bindings subscribe to exactly the
//! keys they read.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use spark_signals::{Signal, batch, flush_sync, signal};

use super::classes::{ClassCache, ClassResolver, default_class_list};
use super::events::{EventEmitter, Listener};
use crate::expression::Function;
use crate::types::Value;

/// Default prefix used by [`default_class_list`].
pub const DEFAULT_CLASS_PREFIX: &str = "formkit";

/// A write whose event waits for the end of a [`NodeContext::batch`].
#[derive(Debug, Clone, PartialEq)]
enum Write {
    Value(Value),
    Prop(String, Value),
    Attrs(Value),
}

impl Write {
    fn same_target(&self, other: &Write) -> bool {
        match (self, other) {
            (Write::Value(_), Write::Value(_)) | (Write::Attrs(_), Write::Attrs(_)) => true,
            (Write::Prop(a, _), Write::Prop(b, _)) => a == b,
            _ => false,
        }
    }
}

struct ContextInner {
    value: Signal<Value>,
    /// Prop signals are created on first read or write, so a binding that
    /// reads a prop before it is set still sees the later write.
    props: RefCell<IndexMap<String, Signal<Value>>>,
    attrs: Signal<Value>,
    fns: RefCell<IndexMap<String, Function>>,
    events: EventEmitter,
    classes: ClassCache,
    class_prefix: RefCell<String>,
    class_resolver: RefCell<Option<ClassResolver>>,
    batch_depth: Cell<usize>,
    pending_events: RefCell<Vec<Write>>,
}

/// Shared handle to a node's data.
#[derive(Clone)]
pub struct NodeContext {
    inner: Rc<ContextInner>,
}

impl Default for NodeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeContext {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ContextInner {
                value: signal(Value::Undefined),
                props: RefCell::new(IndexMap::new()),
                attrs: signal(Value::Object(IndexMap::new())),
                fns: RefCell::new(IndexMap::new()),
                events: EventEmitter::new(),
                classes: ClassCache::new(),
                class_prefix: RefCell::new(DEFAULT_CLASS_PREFIX.to_string()),
                class_resolver: RefCell::new(None),
                batch_depth: Cell::new(0),
                pending_events: RefCell::new(Vec::new()),
            }),
        }
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn with_value(self, value: impl Into<Value>) -> Self {
        self.inner.value.set(value.into());
        self
    }

    pub fn with_prop(self, name: &str, value: impl Into<Value>) -> Self {
        self.prop_signal(name).set(value.into());
        self
    }

    /// Set every entry of a JSON object as a prop.
    pub fn with_props(self, props: serde_json::Value) -> Self {
        if let Value::Object(map) = Value::from(props) {
            for (name, value) in map {
                self.prop_signal(&name).set(value);
            }
        }
        self
    }

    pub fn with_attrs(self, attrs: impl Into<Value>) -> Self {
        self.inner.attrs.set(attrs.into());
        self
    }

    /// Register a function in the `fns` namespace.
    pub fn with_fn(
        self,
        name: &str,
        f: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) -> Self {
        self.inner
            .fns
            .borrow_mut()
            .insert(name.to_string(), Rc::new(f));
        self
    }

    pub fn with_class_prefix(self, prefix: &str) -> Self {
        *self.inner.class_prefix.borrow_mut() = prefix.to_string();
        self.inner.classes.clear();
        self
    }

    /// Replace the class computation for every section.
    ///
    /// This is the one place schema rendering accepts a function instead of
    /// data: class lists may depend on arbitrary embedder logic.
    pub fn with_class_resolver(
        self,
        resolver: impl Fn(&str, &NodeContext) -> String + 'static,
    ) -> Self {
        *self.inner.class_resolver.borrow_mut() = Some(Rc::new(resolver));
        self.inner.classes.clear();
        self
    }

    // =========================================================================
    // Reads (tracked)
    // =========================================================================

    pub fn value(&self) -> Value {
        self.inner.value.get()
    }

    pub fn prop(&self, name: &str) -> Value {
        self.prop_signal(name).get()
    }

    pub fn attrs(&self) -> Value {
        self.inner.attrs.get()
    }

    /// Snapshot of every prop set so far.
    pub fn props(&self) -> IndexMap<String, Value> {
        let signals: Vec<(String, Signal<Value>)> = self
            .inner
            .props
            .borrow()
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        signals
            .into_iter()
            .map(|(k, s)| (k, s.get()))
            .filter(|(_, v)| *v != Value::Undefined)
            .collect()
    }

    pub fn function(&self, name: &str) -> Option<Function> {
        self.inner.fns.borrow().get(name).cloned()
    }

    /// Class list for `section`, computed on first access.
    pub fn classes(&self, section: &str) -> String {
        let weak = Rc::downgrade(&self.inner);
        let name = section.to_string();
        self.inner.classes.get_or_compute(section, move || {
            Box::new(move || resolve_classes(&weak, &name))
        })
    }

    pub fn class_cache(&self) -> &ClassCache {
        &self.inner.classes
    }

    fn prop_signal(&self, name: &str) -> Signal<Value> {
        if let Some(existing) = self.inner.props.borrow().get(name) {
            return existing.clone();
        }
        let created = signal(Value::Undefined);
        self.inner
            .props
            .borrow_mut()
            .insert(name.to_string(), created.clone());
        created
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set the node value. Emits `input`.
    pub fn set_value(&self, value: impl Into<Value>) {
        self.write(Write::Value(value.into()));
    }

    /// Set a prop. Emits `prop:<name>`.
    pub fn set_prop(&self, name: &str, value: impl Into<Value>) {
        self.write(Write::Prop(name.to_string(), value.into()));
    }

    pub fn set_attrs(&self, attrs: impl Into<Value>) {
        self.write(Write::Attrs(attrs.into()));
    }

    /// Run `f` with its writes coalesced into one update pass.
    ///
    /// Writes land at once, but bindings re-run only when the outermost
    /// batch returns. Events wait until then too and fire once per target
    /// with the last value written. Batches nest.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
        let result = batch(f);
        let depth = self.inner.batch_depth.get() - 1;
        self.inner.batch_depth.set(depth);

        if depth == 0 {
            flush_sync();
            let events = std::mem::take(&mut *self.inner.pending_events.borrow_mut());
            if !events.is_empty() {
                tracing::debug!(events = events.len(), "emitting batched events");
            }
            for write in &events {
                self.notify(write);
            }
        }
        result
    }

    fn write(&self, write: Write) {
        self.apply(&write);
        if self.inner.batch_depth.get() > 0 {
            let mut pending = self.inner.pending_events.borrow_mut();
            match pending.iter_mut().find(|queued| queued.same_target(&write)) {
                Some(queued) => *queued = write,
                None => pending.push(write),
            }
            return;
        }
        flush_sync();
        self.notify(&write);
    }

    fn apply(&self, write: &Write) {
        match write {
            Write::Value(value) => {
                self.inner.value.set(value.clone());
            }
            Write::Prop(name, value) => {
                self.prop_signal(name).set(value.clone());
            }
            Write::Attrs(attrs) => {
                self.inner.attrs.set(attrs.clone());
            }
        }
    }

    fn notify(&self, write: &Write) {
        match write {
            Write::Value(value) => self.inner.events.emit("input", value),
            Write::Prop(name, value) => self.inner.events.emit(&format!("prop:{name}"), value),
            Write::Attrs(attrs) => self.inner.events.emit("attrs", attrs),
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn on(&self, event: &str, handler: impl Fn(&Value) + 'static) -> Listener {
        self.inner.events.on(event, handler)
    }

    pub fn emit(&self, event: &str, payload: &Value) {
        self.inner.events.emit(event, payload);
    }

    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("props", &self.inner.props.borrow().keys().collect::<Vec<_>>())
            .field("fns", &self.inner.fns.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

fn resolve_classes(inner: &Weak<ContextInner>, section: &str) -> String {
    let Some(inner) = inner.upgrade() else {
        return String::new();
    };
    let ctx = NodeContext { inner };
    let resolver = ctx.inner.class_resolver.borrow().clone();
    match resolver {
        Some(resolver) => resolver(section, &ctx),
        None => {
            let prefix = ctx.inner.class_prefix.borrow().clone();
            default_class_list(&prefix, section, &ctx)
        }
    }
}
