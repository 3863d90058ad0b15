//! Scope chain.
//!
//! Expressions resolve `$name` by walking frames from the innermost outward:
//! loop frames (item and index signals), value frames (slot arguments), and
//! finally the root frame backed by the [`NodeContext`].
//!
//! Root names:
//! - `$value`, `$attrs` - the context's value and attribute passthrough
//! - `$classes.<section>` - lazily computed class list
//! - `$slots.<section>` - `true` when the embedder supplied that slot
//! - `$props.<name>` or bare `$<name>` - a prop
//! - `$fns.<name>(...)` - a function call

use std::rc::Rc;

use indexmap::IndexMap;
use spark_signals::Signal;

use super::NodeContext;
use crate::expression::{Function, Resolver};
use crate::pipeline::{DiagnosticKind, Diagnostics};
use crate::primitives::Slots;
use crate::types::Value;

enum Frame {
    Root {
        context: NodeContext,
        slots: Slots,
        diagnostics: Diagnostics,
    },
    Loop {
        item: (Rc<str>, Signal<Value>),
        index: Option<(Rc<str>, Signal<Value>)>,
        parent: Scope,
    },
    Values {
        values: IndexMap<String, Value>,
        parent: Scope,
    },
}

#[derive(Clone)]
pub struct Scope {
    frame: Rc<Frame>,
}

impl Scope {
    pub fn new(context: NodeContext, slots: Slots, diagnostics: Diagnostics) -> Self {
        Self {
            frame: Rc::new(Frame::Root {
                context,
                slots,
                diagnostics,
            }),
        }
    }

    /// Push a loop frame. Reads of `item`/`index` subscribe to the given signals.
    pub fn with_loop(
        &self,
        item: &str,
        item_signal: Signal<Value>,
        index: Option<(&str, Signal<Value>)>,
    ) -> Scope {
        Scope {
            frame: Rc::new(Frame::Loop {
                item: (Rc::from(item), item_signal),
                index: index.map(|(name, s)| (Rc::from(name), s)),
                parent: self.clone(),
            }),
        }
    }

    /// Push a frame of plain values.
    pub fn with_values(&self, values: IndexMap<String, Value>) -> Scope {
        Scope {
            frame: Rc::new(Frame::Values {
                values,
                parent: self.clone(),
            }),
        }
    }

    /// The outermost scope, without any loop or value frames.
    pub fn root(&self) -> Scope {
        let mut scope = self;
        loop {
            match scope.frame.as_ref() {
                Frame::Root { .. } => return scope.clone(),
                Frame::Loop { parent, .. } | Frame::Values { parent, .. } => scope = parent,
            }
        }
    }

    /// Every variable bound by loop and value frames, innermost wins.
    ///
    /// Reading loop variables here subscribes the caller to them.
    pub fn loop_values(&self) -> IndexMap<String, Value> {
        let mut frames = Vec::new();
        let mut scope = self;
        while let Frame::Loop { parent, .. } | Frame::Values { parent, .. } = scope.frame.as_ref() {
            frames.push(scope);
            scope = parent;
        }

        let mut out = IndexMap::new();
        for scope in frames.into_iter().rev() {
            match scope.frame.as_ref() {
                Frame::Loop { item, index, .. } => {
                    out.insert(item.0.to_string(), item.1.get());
                    if let Some((name, signal)) = index {
                        out.insert(name.to_string(), signal.get());
                    }
                }
                Frame::Values { values, .. } => {
                    out.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Frame::Root { .. } => {}
            }
        }
        out
    }

    fn root_parts(&self) -> (&NodeContext, &Slots, &Diagnostics) {
        let mut scope = self;
        loop {
            match scope.frame.as_ref() {
                Frame::Root {
                    context,
                    slots,
                    diagnostics,
                } => return (context, slots, diagnostics),
                Frame::Loop { parent, .. } | Frame::Values { parent, .. } => scope = parent,
            }
        }
    }

    pub fn context(&self) -> &NodeContext {
        self.root_parts().0
    }

    pub fn slots(&self) -> &Slots {
        self.root_parts().1
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.root_parts().2
    }

    fn lookup_root(&self, root: &str, segments: &[String]) -> Value {
        let (ctx, slots, _) = self.root_parts();
        match root {
            "value" => ctx.value().get_path(segments),
            "attrs" => ctx.attrs().get_path(segments),
            "classes" => match segments.split_first() {
                Some((section, rest)) => Value::String(ctx.classes(section)).get_path(rest),
                None => Value::Undefined,
            },
            "slots" => match segments.first() {
                Some(name) => Value::Bool(slots.contains(name)),
                None => Value::Object(
                    slots
                        .names()
                        .into_iter()
                        .map(|name| (name, Value::Bool(true)))
                        .collect(),
                ),
            },
            "props" => match segments.split_first() {
                Some((name, rest)) => ctx.prop(name).get_path(rest),
                None => Value::Object(ctx.props()),
            },
            "fns" => Value::Undefined,
            name => ctx.prop(name).get_path(segments),
        }
    }
}

impl Resolver for Scope {
    fn lookup(&self, root: &str, segments: &[String]) -> Value {
        let mut scope = self;
        loop {
            match scope.frame.as_ref() {
                Frame::Loop { item, index, parent } => {
                    if &*item.0 == root {
                        return item.1.get().get_path(segments);
                    }
                    match index {
                        Some((name, signal)) if &**name == root => {
                            return signal.get().get_path(segments);
                        }
                        _ => scope = parent,
                    }
                }
                Frame::Values { values, parent } => {
                    if let Some(value) = values.get(root) {
                        return value.get_path(segments);
                    }
                    scope = parent;
                }
                Frame::Root { .. } => return scope.lookup_root(root, segments),
            }
        }
    }

    fn function(&self, name: &str) -> Option<Function> {
        self.context().function(name)
    }

    fn unresolved_function(&self, name: &str) {
        self.diagnostics().report(
            DiagnosticKind::UnknownFunction,
            &format!("fns.{name}"),
            &format!("unknown function `{name}`, evaluating to undefined"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::compile;
    use spark_signals::signal;

    fn root(ctx: NodeContext) -> Scope {
        Scope::new(ctx, Slots::new(), Diagnostics::new())
    }

    fn eval(scope: &Scope, source: &str) -> Value {
        compile(source).unwrap().evaluate(scope).unwrap()
    }

    #[test]
    fn test_loop_frames_shadow_props() {
        let scope = root(NodeContext::new().with_prop("item", "prop"));
        let item = signal(Value::from("loop"));
        let inner = scope.with_loop("item", item.clone(), Some(("i", signal(Value::from(2)))));

        assert_eq!(eval(&inner, "$item"), Value::from("loop"));
        assert_eq!(eval(&inner, "$i + 1"), Value::from(3));
        assert_eq!(eval(&scope, "$item"), Value::from("prop"));

        item.set(Value::from("changed"));
        assert_eq!(eval(&inner, "$item"), Value::from("changed"));
    }

    #[test]
    fn test_root_names() {
        let ctx = NodeContext::new()
            .with_value("typed")
            .with_prop("label", "Name")
            .with_attrs(serde_json::json!({ "placeholder": "..." }));
        let scope = root(ctx);

        assert_eq!(eval(&scope, "$value"), Value::from("typed"));
        assert_eq!(eval(&scope, "$props.label"), Value::from("Name"));
        assert_eq!(eval(&scope, "$attrs.placeholder"), Value::from("..."));
        assert_eq!(eval(&scope, "$classes.label"), Value::from("formkit-label"));
        assert_eq!(eval(&scope, "$slots.label"), Value::Bool(false));
    }

    #[test]
    fn test_unknown_function_reported_once() {
        let scope = root(NodeContext::new());
        assert_eq!(eval(&scope, "$fns.nope()"), Value::Undefined);
        assert_eq!(eval(&scope, "$fns.nope()"), Value::Undefined);
        let entries = scope.diagnostics().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiagnosticKind::UnknownFunction);
    }

    #[test]
    fn test_loop_values_innermost_wins() {
        let scope = root(NodeContext::new());
        let outer = scope.with_loop("row", signal(Value::from("r1")), None);
        let mut args = IndexMap::new();
        args.insert("row".to_string(), Value::from("override"));
        args.insert("extra".to_string(), Value::from(1));
        let inner = outer.with_values(args);

        let values = inner.loop_values();
        assert_eq!(values.get("row"), Some(&Value::from("override")));
        assert_eq!(values.get("extra"), Some(&Value::from(1)));
        assert!(inner.root().loop_values().is_empty());
    }
}
