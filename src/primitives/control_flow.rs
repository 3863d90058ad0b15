//! Control Flow Primitives - Conditionals, loops and slots.
//!
//! - [`show`] - Mount one branch of an `if/then/else`
//! - [`each`] - Keyed list rendering with fine-grained item updates
//! - [`slot`] - Embedder content for a section, or its default markup
//!
//! # Pattern: EffectScope-based Cleanup
//!
//! All control flow primitives use spark-signals' EffectScope for cleanup:
//! 1. Create an EffectScope to manage the lifetime of child effects
//! 2. Run rendering logic inside `scope.run()`
//! 3. Register cleanup with `on_scope_dispose()`
//! 4. Return a Cleanup that stops the scope and releases the anchor
//!
//! # Pattern: Anchors
//!
//! Each primitive allocates a fragment "anchor" under the current parent at
//! mount time and renders everything beneath it. A branch flip or a new loop
//! item therefore lands in the right place among its siblings without
//! touching them.
//!
//! # Pattern: Owned Bodies
//!
//! A branch, loop item or slot body is mounted with [`mount_owned`], never
//! directly inside the effect that decided to mount it. Its bindings then
//! live until its own cleanup runs, not until that effect's next run.
//!
//! # Component Lifecycle
//!
//! ## show()
//! - Condition becomes truthy: `then` mounted
//! - Condition becomes falsy: `then` fully unmounted first, then `else` mounted
//! - Same truthiness: nothing happens
//!
//! ## each()
//! - Items tracked by key
//! - New keys: create item/index signals + mount body
//! - Existing keys: update signals only (NO remount!)
//! - Removed keys: cleanup + release
//! - Reordered keys: anchor children reordered, nothing remounted

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use spark_signals::{Signal, effect, effect_scope, on_scope_dispose, signal};

use crate::engine::OutputKind;
use crate::pipeline::{
    CompiledConditional, CompiledLoop, CompiledSlot, DiagnosticKind, LoopKeying, compile_schema,
    mount_node,
};
use crate::state::Scope;
use crate::types::Value;

use super::types::{Cleanup, Runtime, mount_owned};

/// Largest `n` a numeric loop source may expand to.
pub const MAX_NUMERIC_SOURCE: usize = 10_000;

/// Conditionally mount one of two branches.
///
/// An evaluation error keeps the current branch.
pub fn show(cond: &Rc<CompiledConditional>, scope: &Scope, rt: &Runtime) -> Cleanup {
    let tree = rt.tree.clone();
    let anchor = tree.allocate(OutputKind::Fragment, None);

    let cleanup: Rc<RefCell<Option<Cleanup>>> = Rc::new(RefCell::new(None));
    let was_true: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));

    let fx_scope = effect_scope(false);
    let cleanup_for_update = cleanup.clone();
    let cleanup_for_dispose = cleanup.clone();
    let release_binding = rt.track_binding();

    let cond = cond.clone();
    let scope = scope.clone();
    let rt = rt.clone();

    fx_scope.run(move || {
        let _effect = effect(move || {
            let Some(value) = rt.evaluate(&cond.condition, &scope, &cond.location) else {
                return;
            };
            let truthy = value.is_truthy();

            // Skip if condition unchanged
            if was_true.get() == Some(truthy) {
                return;
            }
            was_true.set(Some(truthy));
            tracing::debug!(location = %cond.location, truthy, "branch flip");

            // Unmount the previous branch before mounting the next
            let previous = cleanup_for_update.borrow_mut().take();
            if let Some(previous) = previous {
                previous();
            }

            let branch = if truthy {
                Some(cond.then.clone())
            } else {
                cond.otherwise.clone()
            };
            let next = branch.map(|node| {
                let scope = scope.clone();
                let rt = rt.clone();
                mount_owned(move || rt.tree.with_parent(anchor, || mount_node(&node, &scope, &rt)))
            });
            *cleanup_for_update.borrow_mut() = next;
        });

        on_scope_dispose(move || {
            let current = cleanup_for_dispose.borrow_mut().take();
            if let Some(current) = current {
                current();
            }
        });
    });

    Box::new(move || {
        fx_scope.stop();
        release_binding();
        tree.release(anchor);
    })
}

// =============================================================================
// each() - Keyed list rendering
// =============================================================================

struct LoopEntry {
    item: Signal<Value>,
    index: Signal<Value>,
    fragment: usize,
    cleanup: Cleanup,
}

/// `(index, item)` pairs of a loop source.
///
/// Arrays yield positions, objects yield their keys, and a non-negative
/// number `n` yields `0..n` up to [`MAX_NUMERIC_SOURCE`].
fn loop_items(source: Value) -> Result<Vec<(Value, Value)>, String> {
    match source {
        Value::Undefined | Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (Value::from(i), item))
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, item)| (Value::String(key), item))
            .collect()),
        Value::Number(n) if n.is_finite() && n >= 0.0 => {
            if n > MAX_NUMERIC_SOURCE as f64 {
                return Err(format!(
                    "numeric loop source {n} exceeds the limit of {MAX_NUMERIC_SOURCE}"
                ));
            }
            Ok((0..n as usize).map(|i| (Value::from(i), Value::from(i))).collect())
        }
        other => Err(format!("cannot iterate over {}", other.type_name())),
    }
}

/// Render a list with one mounted body per item.
///
/// Items are matched by the loop's `key` expression when present, otherwise
/// by [`LoopKeying`]. Existing items keep their mounted subtree: only their
/// item and index signals are updated. Duplicate explicit keys are reported
/// and only the first occurrence is rendered.
pub fn each(lp: &Rc<CompiledLoop>, scope: &Scope, rt: &Runtime) -> Cleanup {
    let tree = rt.tree.clone();
    let anchor = tree.allocate(OutputKind::Fragment, None);

    let entries: Rc<RefCell<IndexMap<String, LoopEntry>>> = Rc::new(RefCell::new(IndexMap::new()));
    let entries_effect = entries.clone();
    let entries_dispose = entries.clone();

    let fx_scope = effect_scope(false);
    let release_binding = rt.track_binding();

    let lp = lp.clone();
    let scope = scope.clone();
    let rt = rt.clone();

    fx_scope.run(move || {
        let _effect = effect(move || {
            let Some(source) = rt.evaluate(&lp.source, &scope, &lp.location) else {
                return;
            };
            let items = match loop_items(source) {
                Ok(items) => items,
                Err(message) => {
                    rt.report(DiagnosticKind::Runtime, &lp.location, &message);
                    return;
                }
            };

            // Resolve keys
            let mut keyed: Vec<(String, Value, Value)> = Vec::with_capacity(items.len());
            let mut occurrences: HashMap<String, usize> = HashMap::new();
            for (position, (index, item)) in items.into_iter().enumerate() {
                let key = match &lp.key {
                    Some(key_expr) => {
                        let mut frame = IndexMap::new();
                        frame.insert(lp.item.clone(), item.clone());
                        if let Some(name) = &lp.index {
                            frame.insert(name.clone(), index.clone());
                        }
                        let Some(key) = rt.evaluate(key_expr, &scope.with_values(frame), &lp.location)
                        else {
                            continue;
                        };
                        let key = key.identity_key();
                        if occurrences.insert(key.clone(), 1).is_some() {
                            rt.report(
                                DiagnosticKind::DuplicateKey,
                                &lp.location,
                                &format!("duplicate loop key {key}; keys must be unique"),
                            );
                            continue;
                        }
                        key
                    }
                    None if rt.options.loop_keys == LoopKeying::Index => format!("#{position}"),
                    None => {
                        let base = item.identity_key();
                        let seen = occurrences.entry(base.clone()).or_insert(0);
                        let key = format!("{base}#{seen}");
                        *seen += 1;
                        key
                    }
                };
                keyed.push((key, index, item));
            }

            // Update existing items, mount new ones
            let mut order = Vec::with_capacity(keyed.len());
            let mut mounted = 0usize;
            {
                let mut map = entries_effect.borrow_mut();
                for (key, index, item) in &keyed {
                    if let Some(entry) = map.get(key) {
                        entry.item.set(item.clone());
                        entry.index.set(index.clone());
                        order.push(entry.fragment);
                        continue;
                    }

                    let item_signal = signal(item.clone());
                    let index_signal = signal(index.clone());
                    let fragment = rt.tree.with_parent(anchor, || rt.tree.allocate(OutputKind::Fragment, None));
                    let item_scope = scope.with_loop(
                        &lp.item,
                        item_signal.clone(),
                        lp.index.as_deref().map(|name| (name, index_signal.clone())),
                    );
                    let body = lp.body.clone();
                    let body_rt = rt.clone();
                    let cleanup = mount_owned(move || {
                        body_rt
                            .tree
                            .with_parent(fragment, || mount_node(&body, &item_scope, &body_rt))
                    });

                    map.insert(
                        key.clone(),
                        LoopEntry {
                            item: item_signal,
                            index: index_signal,
                            fragment,
                            cleanup,
                        },
                    );
                    order.push(fragment);
                    mounted += 1;
                }
            }

            // Cleanup removed items
            let removed: Vec<LoopEntry> = {
                let mut map = entries_effect.borrow_mut();
                let stale: Vec<String> = map
                    .keys()
                    .filter(|key| !keyed.iter().any(|(k, _, _)| k == *key))
                    .cloned()
                    .collect();
                stale
                    .iter()
                    .filter_map(|key| map.shift_remove(key))
                    .collect()
            };
            let removed_count = removed.len();
            for entry in removed {
                (entry.cleanup)();
                rt.tree.release(entry.fragment);
            }

            let moved = rt.tree.reorder_children(anchor, order);
            tracing::debug!(
                location = %lp.location,
                items = keyed.len(),
                mounted,
                removed = removed_count,
                moved,
                "reconciled loop"
            );
        });

        // Cleanup all items when scope is disposed
        on_scope_dispose(move || {
            let drained: Vec<LoopEntry> = entries_dispose.borrow_mut().drain(..).map(|(_, e)| e).collect();
            for entry in drained {
                (entry.cleanup)();
            }
        });
    });

    Box::new(move || {
        fx_scope.stop();
        release_binding();
        tree.release(anchor);
    })
}

// =============================================================================
// slot() - Embedder content or default markup
// =============================================================================

/// Mount the embedder's slot for a section, or the section's default markup.
///
/// Slot presence is decided at mount time. Slot content is evaluated against
/// the root scope plus the enclosing loop variables, which are also passed
/// to the slot callback; the content re-renders when those change.
pub fn slot(guard: &Rc<CompiledSlot>, scope: &Scope, rt: &Runtime) -> Cleanup {
    let Some(render) = scope.slots().get(&guard.name) else {
        return mount_node(&guard.default, scope, rt);
    };

    let tree = rt.tree.clone();
    let anchor = tree.allocate(OutputKind::Fragment, Some(&guard.name));

    let cleanup: Rc<RefCell<Option<Cleanup>>> = Rc::new(RefCell::new(None));
    let cleanup_for_update = cleanup.clone();
    let cleanup_for_dispose = cleanup.clone();

    let fx_scope = effect_scope(false);
    let release_binding = rt.track_binding();

    let guard = guard.clone();
    let scope = scope.clone();
    let rt = rt.clone();

    fx_scope.run(move || {
        let _effect = effect(move || {
            let args = scope.loop_values();
            let content = render(&args);

            let compiled = match compile_schema(&content, &rt.cache) {
                Ok(compiled) => compiled,
                Err(err) => {
                    rt.report(DiagnosticKind::Runtime, &guard.location, &err.to_string());
                    return;
                }
            };

            let previous = cleanup_for_update.borrow_mut().take();
            if let Some(previous) = previous {
                previous();
            }

            let slot_scope = scope.root().with_values(args);
            let slot_rt = rt.clone();
            let next = mount_owned(move || {
                slot_rt
                    .tree
                    .with_parent(anchor, || mount_node(&compiled, &slot_scope, &slot_rt))
            });
            *cleanup_for_update.borrow_mut() = Some(next);
        });

        on_scope_dispose(move || {
            let current = cleanup_for_dispose.borrow_mut().take();
            if let Some(current) = current {
                current();
            }
        });
    });

    Box::new(move || {
        fx_scope.stop();
        release_binding();
        tree.release(anchor);
    })
}
