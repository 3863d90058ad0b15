//! Reactive interpreter: subscriptions, branches, loops, slots, errors.
//!
//! Run with: cargo test --test interpreter

use std::sync::Arc;

use serde_json::json;
use spark_schema::{
    DiagnosticKind, ExpressionCache, ExpressionError, Interpreter, InterpreterOptions, LoopKeying,
    MountHandle, NodeContext, SchemaError, SchemaNode, Slots, compile, mount,
};

fn schema(value: serde_json::Value) -> SchemaNode {
    SchemaNode::from_json(value).unwrap()
}

fn mount_json(value: serde_json::Value, ctx: &NodeContext) -> MountHandle {
    mount(&schema(value), ctx, Slots::new()).unwrap()
}

/// Text of each rendered item under the `list` section, in order.
fn list_items(handle: &MountHandle) -> Vec<(usize, String)> {
    let tree = handle.tree();
    let list = handle.find_section("list").expect("list is mounted");
    let mut items = Vec::new();
    for anchor in tree.children(list) {
        for fragment in tree.children(anchor) {
            items.push((fragment, tree.text_content(fragment)));
        }
    }
    items
}

// =============================================================================
// BINDINGS
// =============================================================================

#[test]
fn each_dynamic_value_is_its_own_binding() {
    let ctx = NodeContext::new().with_props(json!({ "label": "Name", "id": "name" }));
    let handle = mount_json(
        json!({
            "$el": "label",
            "attrs": { "for": "$id", "title": "$label", "static": "yes" },
            "children": "$label"
        }),
        &ctx,
    );
    assert_eq!(handle.active_bindings(), 3);

    let root = handle.tree().roots()[0];
    let element = handle.tree().children(root)[0];
    let text = handle.tree().children(element)[0];
    let element_version = handle.tree().version(element).unwrap();
    let text_version = handle.tree().version(text).unwrap();

    ctx.set_prop("id", "full-name");
    assert_eq!(handle.tree().version(element), Some(element_version + 1), "one attribute patched");
    assert_eq!(handle.tree().version(text), Some(text_version), "text untouched");
    assert_eq!(
        handle.to_json(),
        json!([{
            "$el": "label",
            "attrs": { "for": "full-name", "title": "Name", "static": "yes" },
            "children": ["Name"]
        }])
    );
}

#[test]
fn bind_spreads_and_explicit_attrs_win() {
    let ctx = NodeContext::new()
        .with_attrs(json!({ "placeholder": "Type here", "id": "spread" }))
        .with_prop("id", "explicit");
    let handle = mount_json(json!({ "$el": "input", "bind": "$attrs", "attrs": { "id": "$id" } }), &ctx);
    assert_eq!(
        handle.to_json(),
        json!([{ "$el": "input", "attrs": { "placeholder": "Type here", "id": "explicit" } }])
    );

    ctx.set_attrs(json!({ "autocomplete": "off" }));
    assert_eq!(
        handle.to_json(),
        json!([{ "$el": "input", "attrs": { "id": "explicit", "autocomplete": "off" } }])
    );
}

// =============================================================================
// CONDITIONALS
// =============================================================================

#[test]
fn branch_flip_leaves_no_residual_bindings() {
    let ctx = NodeContext::new().with_props(json!({ "show": true, "title": "Hello" }));
    let handle = mount_json(
        json!({
            "if": "$show",
            "then": { "$el": "p", "attrs": { "title": "$title" }, "children": "$title" },
            "else": "hidden"
        }),
        &ctx,
    );
    let with_then = handle.active_bindings();
    let nodes_with_then = handle.tree().allocated_count();
    assert_eq!(with_then, 3, "condition, attribute and text");

    for _ in 0..5 {
        ctx.set_prop("show", false);
        assert_eq!(handle.active_bindings(), 1, "only the condition remains");
        assert_eq!(handle.to_json(), json!(["hidden"]));

        // The discarded branch must not react
        ctx.set_prop("title", "ignored");
        assert_eq!(handle.to_json(), json!(["hidden"]));

        ctx.set_prop("show", true);
        assert_eq!(handle.active_bindings(), with_then);
        assert_eq!(handle.tree().allocated_count(), nodes_with_then);
    }
    assert_eq!(
        handle.to_json(),
        json!([{ "$el": "p", "attrs": { "title": "ignored" }, "children": ["ignored"] }])
    );
}

#[test]
fn same_truthiness_does_not_remount() {
    let ctx = NodeContext::new().with_prop("count", 1);
    let handle = mount_json(json!({ "if": "$count", "then": { "$el": "b" } }), &ctx);
    let anchor = handle.tree().children(handle.root())[0];
    let element = handle.tree().children(anchor)[0];
    ctx.set_prop("count", 2);
    assert_eq!(handle.tree().children(anchor), vec![element], "still the same element");
}

#[test]
fn branch_keeps_reacting_when_condition_reruns() {
    let ctx = NodeContext::new().with_prop("label", "Name");
    let handle = mount_json(
        json!({
            "if": "$label",
            "then": { "$el": "label", "attrs": { "title": "$label" }, "children": "$label" }
        }),
        &ctx,
    );
    let bindings = handle.active_bindings();

    // Condition and branch both read `label`; truthiness never changes
    for label in ["Full Name", "Other"] {
        ctx.set_prop("label", label);
        assert_eq!(
            handle.to_json(),
            json!([{ "$el": "label", "attrs": { "title": label }, "children": [label] }])
        );
        assert_eq!(handle.active_bindings(), bindings);
    }

    ctx.set_prop("label", "");
    assert_eq!(handle.to_json(), json!([]));
    ctx.set_prop("label", "Back");
    assert_eq!(
        handle.to_json(),
        json!([{ "$el": "label", "attrs": { "title": "Back" }, "children": ["Back"] }])
    );
    assert!(handle.diagnostics().is_empty());
}

#[test]
fn loop_inside_branch_survives_condition_rerun() {
    let ctx = NodeContext::new()
        .with_prop("count", 1)
        .with_prop("items", json!(["x"]));
    let handle = mount_json(
        json!({
            "if": "$count",
            "then": {
                "$el": "ul",
                "meta": { "section": "list" },
                "children": [{ "$el": "li", "for": ["item", "$items"], "children": "$item + $count" }]
            }
        }),
        &ctx,
    );

    ctx.set_prop("count", 2);
    ctx.set_prop("items", json!(["x", "y"]));
    let texts: Vec<String> = list_items(&handle).into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, ["x2", "y2"]);

    ctx.set_prop("count", 3);
    let texts: Vec<String> = list_items(&handle).into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, ["x3", "y3"]);
}

// =============================================================================
// LOOPS
// =============================================================================

#[test]
fn reorder_preserves_item_identity() {
    let ctx = NodeContext::new().with_prop("items", json!(["x", "y", "z"]));
    let handle = mount_json(
        json!({
            "$el": "ul",
            "meta": { "section": "list" },
            "children": [{ "$el": "li", "for": ["item", "$items"], "children": "$item" }]
        }),
        &ctx,
    );

    let before = list_items(&handle);
    assert_eq!(
        before.iter().map(|(_, text)| text.as_str()).collect::<Vec<_>>(),
        ["x", "y", "z"]
    );
    let nodes = handle.tree().allocated_count();

    ctx.set_prop("items", json!(["z", "x", "y"]));
    let after = list_items(&handle);
    assert_eq!(
        after.iter().map(|(_, text)| text.as_str()).collect::<Vec<_>>(),
        ["z", "x", "y"]
    );
    for (fragment, text) in &after {
        let (original, _) = before.iter().find(|(_, t)| t == text).unwrap();
        assert_eq!(fragment, original, "{text} kept its subtree");
    }
    assert_eq!(handle.tree().allocated_count(), nodes, "nothing remounted");
}

#[test]
fn explicit_key_updates_item_in_place() {
    let ctx = NodeContext::new().with_prop(
        "users",
        json!([{ "id": 1, "name": "Ada" }, { "id": 2, "name": "Lin" }]),
    );
    let handle = mount_json(
        json!({
            "$el": "ul",
            "meta": { "section": "list" },
            "children": [{
                "$el": "li",
                "for": ["user", "i", "$users"],
                "key": "$user.id",
                "children": [{ "$el": null, "children": "$i" }, ": ", { "$el": null, "children": "$user.name" }]
            }]
        }),
        &ctx,
    );
    let before = list_items(&handle);
    assert_eq!(before[1].1, "1: Lin");

    ctx.set_prop("users", json!([{ "id": 2, "name": "Lin B." }, { "id": 1, "name": "Ada" }]));
    let after = list_items(&handle);
    assert_eq!(after[0], (before[1].0, "0: Lin B.".to_string()));
    assert_eq!(after[1], (before[0].0, "1: Ada".to_string()));
}

#[test]
fn duplicate_keys_are_reported_and_skipped() {
    let ctx = NodeContext::new().with_prop("xs", json!([{ "k": "a" }, { "k": "a" }, { "k": "b" }]));
    let handle = mount_json(
        json!({
            "$el": "ul",
            "meta": { "section": "list" },
            "children": [{ "$el": "li", "for": ["x", "$xs"], "key": "$x.k", "children": "$x.k" }]
        }),
        &ctx,
    );
    let texts: Vec<String> = list_items(&handle).into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, ["a", "b"]);
    assert!(
        handle
            .diagnostics()
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::DuplicateKey)
    );
}

#[test]
fn index_keying_reuses_positions() {
    let ctx = NodeContext::new().with_prop("items", json!(["x", "y"]));
    let handle = Interpreter::new()
        .with_options(InterpreterOptions::default().with_loop_keys(LoopKeying::Index))
        .mount(
            &schema(json!({
                "$el": "ul",
                "meta": { "section": "list" },
                "children": [{ "$el": "li", "for": ["item", "$items"], "children": "$item" }]
            })),
            &ctx,
            Slots::new(),
        )
        .unwrap();
    let before = list_items(&handle);

    ctx.set_prop("items", json!(["y", "x"]));
    let after = list_items(&handle);
    assert_eq!(after[0], (before[0].0, "y".to_string()), "position 0 kept its fragment");
}

#[test]
fn kept_items_follow_later_changes() {
    let ctx = NodeContext::new()
        .with_prop("rows", json!([{ "id": 1, "n": "a" }]))
        .with_prop("suffix", "!");
    let handle = mount_json(
        json!({
            "$el": "ul",
            "meta": { "section": "list" },
            "children": [{ "$el": "li", "for": ["row", "$rows"], "key": "$row.id", "children": "$row.n + $suffix" }]
        }),
        &ctx,
    );
    let first = list_items(&handle)[0].0;

    ctx.set_prop("rows", json!([{ "id": 1, "n": "b" }, { "id": 2, "n": "c" }]));
    ctx.set_prop("suffix", "?");
    let items = list_items(&handle);
    assert_eq!(items[0], (first, "b?".to_string()), "kept item re-rendered in place");
    assert_eq!(items[1].1, "c?");

    // Reorder, then change a kept item again
    ctx.set_prop("rows", json!([{ "id": 2, "n": "c" }, { "id": 1, "n": "b" }]));
    ctx.set_prop("rows", json!([{ "id": 2, "n": "c" }, { "id": 1, "n": "z" }]));
    ctx.set_prop("suffix", ".");
    let items = list_items(&handle);
    assert_eq!(items[0].1, "c.");
    assert_eq!(items[1], (first, "z.".to_string()));
}

#[test]
fn oversized_numeric_source_is_reported() {
    let ctx = NodeContext::new().with_prop("count", 1e12);
    let handle = mount_json(json!({ "$el": "i", "for": ["n", "$count"], "children": "$n" }), &ctx);
    assert_eq!(handle.to_json(), json!([]));

    let runtime: Vec<_> = handle
        .diagnostics()
        .entries()
        .into_iter()
        .filter(|d| d.kind == DiagnosticKind::Runtime)
        .collect();
    assert_eq!(runtime.len(), 1);
    assert!(runtime[0].message.contains("exceeds"), "{}", runtime[0].message);

    ctx.set_prop("count", 2);
    assert_eq!(
        handle.to_json(),
        json!([{ "$el": "i", "children": ["0"] }, { "$el": "i", "children": ["1"] }])
    );
}

#[test]
fn numeric_and_object_sources() {
    let ctx = NodeContext::new()
        .with_prop("count", 3)
        .with_prop("env", json!({ "a": 1, "b": 2 }));
    let handle = mount_json(
        json!([
            { "$el": "i", "for": ["n", "$count"], "children": "$n" },
            { "$el": "b", "for": ["v", "k", "$env"], "children": "$k + '=' + $v" }
        ]),
        &ctx,
    );
    let json = handle.to_json();
    let rendered: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["children"][0].as_str().unwrap())
        .collect();
    assert_eq!(rendered, ["0", "1", "2", "a=1", "b=2"]);
}

// =============================================================================
// SLOTS
// =============================================================================

#[test]
fn slot_takes_precedence_over_default() {
    let ctx = NodeContext::new().with_prop("label", "Email");
    let guarded = json!({
        "$slot": "label",
        "default": { "$el": "label", "children": "$label", "meta": { "section": "label" } }
    });

    let without = mount_json(guarded.clone(), &ctx);
    assert_eq!(without.to_json(), json!([{ "$el": "label", "children": ["Email"] }]));

    let slots = Slots::new().with_node(
        "label",
        schema(json!({ "$el": "strong", "children": "$label" })),
    );
    let with = mount(&schema(guarded), &ctx, slots).unwrap();
    assert_eq!(with.to_json(), json!([{ "$el": "strong", "children": ["Email"] }]));

    ctx.set_prop("label", "E-mail");
    assert_eq!(with.to_json(), json!([{ "$el": "strong", "children": ["E-mail"] }]));
}

#[test]
fn repeated_slot_receives_loop_values() {
    let ctx = NodeContext::new().with_prop("options", json!(["a", "b"]));
    let slots = Slots::new().with("option", |props| {
        let label = props.get("option").map(|v| v.to_display_string()).unwrap_or_default();
        SchemaNode::from_json(json!({ "$el": "em", "children": format!("<{label}>") })).unwrap()
    });
    let handle = mount(
        &schema(json!({
            "$slot": "option",
            "for": ["option", "$options"],
            "default": { "$el": "li", "children": "$option" }
        })),
        &ctx,
        slots,
    )
    .unwrap();

    assert_eq!(
        handle.to_json(),
        json!([
            { "$el": "em", "children": ["<a>"] },
            { "$el": "em", "children": ["<b>"] }
        ])
    );
}

#[test]
fn slots_are_visible_to_expressions() {
    let ctx = NodeContext::new();
    let handle = mount(
        &schema(json!({ "if": "$slots.help", "then": "has help", "else": "no help" })),
        &ctx,
        Slots::new().with_node("help", SchemaNode::text("?")),
    )
    .unwrap();
    assert_eq!(handle.to_json(), json!(["has help"]));
}

// =============================================================================
// ERRORS
// =============================================================================

#[test]
fn runtime_error_is_reported_once_and_keeps_last_value() {
    let ctx = NodeContext::new().with_prop("qty", 2);
    let handle = mount_json(json!({ "$el": "span", "children": "$qty * 10" }), &ctx);
    assert_eq!(handle.to_json(), json!([{ "$el": "span", "children": ["20"] }]));

    ctx.set_prop("qty", json!({ "nested": true }));
    ctx.set_prop("qty", json!({ "nested": false }));
    ctx.set_prop("qty", json!({ "other": 1 }));

    assert_eq!(handle.to_json(), json!([{ "$el": "span", "children": ["20"] }]), "last good value stays");
    let runtime: Vec<_> = handle
        .diagnostics()
        .entries()
        .into_iter()
        .filter(|d| d.kind == DiagnosticKind::Runtime)
        .collect();
    assert_eq!(runtime.len(), 1);
    assert_eq!(runtime[0].node, "span.children");

    ctx.set_prop("qty", 3);
    assert_eq!(handle.to_json(), json!([{ "$el": "span", "children": ["30"] }]), "recovers");
}

#[test]
fn unknown_function_evaluates_to_undefined() {
    let ctx = NodeContext::new()
        .with_prop("name", "ada")
        .with_fn("upper", |args| {
            Ok(args
                .first()
                .map(|v| v.to_display_string().to_uppercase())
                .unwrap_or_default()
                .into())
        });
    let handle = mount_json(
        json!([
            { "$el": "b", "children": "$fns.upper($name)" },
            { "$el": "i", "children": "$fns.lower($name)" },
            { "$el": "u", "children": "$fns.lower($name)" }
        ]),
        &ctx,
    );
    assert_eq!(
        handle.to_json(),
        json!([
            { "$el": "b", "children": ["ADA"] },
            { "$el": "i", "children": [""] },
            { "$el": "u", "children": [""] }
        ])
    );
    let unknown = handle
        .diagnostics()
        .entries()
        .into_iter()
        .filter(|d| d.kind == DiagnosticKind::UnknownFunction)
        .count();
    assert_eq!(unknown, 1, "one warning per function name");
}

#[test]
fn missing_paths_render_empty() {
    let ctx = NodeContext::new().with_prop("user", json!({ "name": "Ada" }));
    let handle = mount_json(json!({ "$el": "p", "children": "$user.address.city" }), &ctx);
    assert_eq!(handle.to_json(), json!([{ "$el": "p", "children": [""] }]));
    assert!(handle.diagnostics().is_empty());
}

#[test]
fn parse_errors_name_the_problem() {
    assert_eq!(compile("").unwrap_err(), ExpressionError::Empty);
    assert!(matches!(
        compile("+ == 10"),
        Err(ExpressionError::LeadingOperator { operator, .. }) if operator == "+"
    ));
    match compile("1 == 10+") {
        Err(ExpressionError::TrailingOperator { fragment, expression }) => {
            assert_eq!(fragment, "10+");
            assert_eq!(expression, "1 == 10+");
        }
        other => panic!("expected trailing operator error, got {other:?}"),
    }
}

#[test]
fn parse_error_in_schema_names_location() {
    let err = mount(
        &schema(json!({ "$el": "p", "attrs": { "class": "$a &&" }, "meta": { "section": "label" } })),
        &NodeContext::new(),
        Slots::new(),
    )
    .unwrap_err();
    match err {
        SchemaError::Expression { location, .. } => assert_eq!(location, "label.attrs.class"),
        other => panic!("expected expression error, got {other}"),
    }
}

#[test]
fn shared_cache_compiles_each_expression_once() {
    let cache = Arc::new(ExpressionCache::new());
    let interpreter = Interpreter::new().with_cache(cache.clone());
    let node = schema(json!([
        { "$el": "a", "children": "$label" },
        { "$el": "b", "children": "$label" },
        { "$el": "c", "attrs": { "title": "$label" } }
    ]));

    let ctx = NodeContext::new();
    let _first = interpreter.mount(&node, &ctx, Slots::new()).unwrap();
    let _second = interpreter.mount(&node, &ctx, Slots::new()).unwrap();
    assert_eq!(cache.len(), 1);
}
