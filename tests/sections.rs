//! Section builder and algebra, exercised through the public API only.
//!
//! Run with: cargo test --test sections

use serde_json::json;
use spark_schema::{
    Extension, ExtensionMap, NodePatch, SchemaNode, Section, attrs_section, create_section,
    each_section, extend_section, find_section, for_section, if_section,
};

// =============================================================================
// FIXTURE (a text input's markup)
// =============================================================================

fn text_input() -> Section {
    let outer = create_section("outer", "div");
    let wrapper = create_section("wrapper", "div");
    let label = create_section("label", "label");
    let inner = create_section("inner", "div");
    let prefix = create_section("prefix", None);
    let input = create_section("input", "input");
    let suffix = create_section("suffix", None);
    let help = create_section("help", "div");

    outer.with([
        wrapper.with([
            if_section("$label", label.with(["$label"]), None),
            inner.with([
                prefix.leaf(),
                attrs_section([("type", "$type"), ("value", "$_value")], input.leaf()),
                suffix.leaf(),
            ]),
        ]),
        if_section("$help", help.with(["$help"]), None),
    ])
}

fn section_node(schema: &SchemaNode, name: &str) -> serde_json::Value {
    find_section(schema, name)
        .unwrap_or_else(|| panic!("section {name} not found"))
        .node
        .to_json()
        .unwrap()
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn builds_are_pure() {
    let section = text_input();
    let extensions = ExtensionMap::new()
        .with("label", NodePatch::new().attr("data-x", 1))
        .with("help", Extension::Remove);

    let first = section.build(&extensions);
    let second = section.build(&extensions);
    assert_eq!(first, second, "same extensions, same schema");
    assert_ne!(first, section.build(&ExtensionMap::new()), "extensions change the result");
    assert_eq!(first, section.build(&extensions), "an earlier build does not leak into a later one");
}

#[test]
fn extension_overrides_nested_section() {
    let schema = text_input().build(
        &ExtensionMap::from_json(json!({
            "label": { "$el": "span", "attrs": { "class": null, "id": "$id" } },
            "prefix": "$prefixIcon",
            "suffix": null
        }))
        .unwrap(),
    );

    assert_eq!(
        section_node(&schema, "label"),
        json!({
            "$el": "span",
            "attrs": { "id": "$id" },
            "children": ["$label"],
            "meta": { "section": "label" }
        })
    );

    // Text replaces the node, and a text node carries no section of its own,
    // so only the guard still names it.
    let prefix = find_section(&schema, "prefix").unwrap();
    assert_eq!(prefix.node, &SchemaNode::text("$prefixIcon"));
    assert_eq!(prefix.guard.map(|g| g.name.as_str()), Some("prefix"));

    assert_eq!(find_section(&schema, "suffix").unwrap().node, &SchemaNode::empty());
}

#[test]
fn extension_merges_attrs_key_by_key() {
    let section = create_section("box", "div").leaf();
    let base = extend_section(section, NodePatch::new().attr("class", "a").attr("id", "x"));
    let schema = base.build(&ExtensionMap::new().with("box", NodePatch::new().attr("class", "b")));

    assert_eq!(
        section_node(&schema, "box"),
        json!({ "$el": "div", "attrs": { "class": "b", "id": "x" }, "meta": { "section": "box" } })
    );
}

#[test]
fn attrs_apply_after_caller_extension() {
    let schema = text_input().build(
        &ExtensionMap::new().with("input", NodePatch::new().attr("type", "password").attr("name", "pw")),
    );
    let input = section_node(&schema, "input");
    assert_eq!(input["attrs"]["type"], json!("$type"));
    assert_eq!(input["attrs"]["name"], json!("pw"));
}

#[test]
fn conditional_sections_keep_their_guard() {
    let schema = text_input().build_default();
    let help = find_section(&schema, "help").expect("help is inside the conditional");
    assert!(help.guard.is_some());
    assert_eq!(help.node.section_name(), Some("help"));
}

#[test]
fn for_on_guard_repeats_slot_or_default() {
    let option = create_section("option", "li").with(["$option.label"]);
    let list = create_section("options", "ul").with([for_section("option", "$options", option)]);
    let schema = list.build_default();

    let found = find_section(&schema, "option").unwrap();
    let guard = found.guard.unwrap();
    assert_eq!(
        serde_json::to_value(&guard.repeat).unwrap(),
        json!(["option", "$options"])
    );
}

#[test]
fn each_section_visits_pre_order() {
    let schema = text_input().build_default();
    let mut names = Vec::new();
    each_section(
        &schema,
        |node| {
            names.push(node.section_name().unwrap_or("?").to_string());
            false
        },
        false,
    );
    assert_eq!(
        names,
        ["outer", "wrapper", "label", "inner", "prefix", "input", "suffix", "help"]
    );
}

#[test]
fn each_section_stops_early() {
    let schema = create_section("a", "div")
        .with([
            create_section("b", "div").leaf(),
            create_section("c", "div").leaf(),
            create_section("d", "div").leaf(),
        ])
        .build_default();

    let mut calls = 0;
    let stopped = each_section(
        &schema,
        |_| {
            calls += 1;
            calls == 2
        },
        true,
    );
    assert!(stopped);
    assert_eq!(calls, 2, "visitor returned true on the second section");
}
