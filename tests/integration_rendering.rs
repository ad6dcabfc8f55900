//! End-to-end rendering through the bundled document

use jstemplate::dom::{Document, NodeId};
use jstemplate::tree::Tree;
use jstemplate::{Engine, EngineConfig, EvalContext, TemplateError, TemplateResult};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};
use std::sync::Arc;

fn document(markup: &str) -> Document {
    Document::parse(markup).expect("valid test markup")
}

fn first(doc: &Document, parent: NodeId) -> NodeId {
    doc.element_children(&parent)[0]
}

fn render(engine: &mut Engine, doc: &mut Document, data: Value) {
    let root = doc.root();
    engine.render_in_place(doc, data, &root);
}

fn attr(doc: &Document, node: NodeId, name: &str) -> Option<String> {
    doc.attribute(&node, name).map(str::to_string)
}

#[test]
fn test_values_and_content_scenario() {
    let mut doc = document(r#"<p data-jst-values="class=$this.name" data-jst-content="$this.description"></p>"#);
    let mut engine = Engine::new();
    let data = json!({"name": "red", "description": "The color red"});

    render(&mut engine, &mut doc, data.clone());
    assert_eq!(
        doc.to_markup(),
        r#"<p data-jst-values="class=$this.name" data-jst-content="$this.description" class="red">The color red</p>"#
    );

    doc.reset_mutations();
    render(&mut engine, &mut doc, data);
    assert_eq!(doc.mutations(), 0);
}

#[test]
fn test_list_growth_preserves_identity() {
    let mut doc = document(
        r#"<ul><li data-jst-select="items" data-jst-values="data-index=$index | data-length=$length" data-jst-content="name"></li></ul>"#,
    );
    let ul = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"items": [{"name": "a"}, {"name": "b"}]}));
    let before = doc.element_children(&ul);
    assert_eq!(before.len(), 2);
    for (index, li) in before.iter().enumerate() {
        assert_eq!(attr(&doc, *li, "data-index"), Some(index.to_string()));
        assert_eq!(attr(&doc, *li, "data-length"), Some("2".to_string()));
    }

    render(
        &mut engine,
        &mut doc,
        json!({"items": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}),
    );
    let after = doc.element_children(&ul);
    assert_eq!(after.len(), 3);
    assert_eq!(&after[..2], &before[..]);
    assert_eq!(attr(&doc, after[2], "data-index"), Some("2".to_string()));
    assert_eq!(attr(&doc, after[2], "data-length"), Some("3".to_string()));
    assert_eq!(attr(&doc, after[0], "data-length"), Some("3".to_string()));
    assert_eq!(doc.text_content(ul), "abc");
}

#[test]
fn test_list_shrinks_to_hidden_placeholder() {
    let mut doc = document(r#"<ul><li data-jst-select="items" data-jst-content="$this"></li></ul>"#);
    let ul = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"items": [1, 2, 3, 4, 5]}));
    assert_eq!(doc.element_children(&ul).len(), 5);

    render(&mut engine, &mut doc, json!({"items": []}));
    let remaining = doc.element_children(&ul);
    assert_eq!(remaining.len(), 1);
    assert!(!doc.is_visible(&remaining[0]));

    render(&mut engine, &mut doc, json!({"items": ["x", "y"]}));
    let regrown = doc.element_children(&ul);
    assert_eq!(regrown.len(), 2);
    assert_eq!(regrown[0], remaining[0]);
    assert!(regrown.iter().all(|li| doc.is_visible(li)));
    assert_eq!(doc.text_content(ul), "xy");
}

#[test]
fn test_list_shrink_keeps_leading_instances() {
    let mut doc = document(r#"<ol><li data-jst-select="items" data-jst-content="$this"></li></ol>"#);
    let ol = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"items": ["a", "b", "c", "d"]}));
    let before = doc.element_children(&ol);

    render(&mut engine, &mut doc, json!({"items": ["e", "f"]}));
    assert_eq!(doc.element_children(&ol), before[..2].to_vec());
    assert_eq!(doc.text_content(ol), "ef");
}

#[test]
fn test_rerender_with_same_data_is_idempotent() {
    let mut doc = document(
        r#"<div><h1 data-jst-content="title"></h1><ul><li data-jst-select="rows"><span data-jst-content="label"></span><b data-jst-select="tags" data-jst-content="$this"></b></li></ul></div>"#,
    );
    let mut engine = Engine::new();
    let data = json!({
        "title": "Report",
        "rows": [
            {"label": "one", "tags": ["x", "y"]},
            {"label": "two", "tags": []},
            {"label": "three", "tags": ["z"]}
        ]
    });

    render(&mut engine, &mut doc, data.clone());
    let first_pass = doc.to_markup();

    doc.reset_mutations();
    render(&mut engine, &mut doc, data);
    assert_eq!(doc.to_markup(), first_pass);
    assert_eq!(doc.mutations(), 0);
}

#[rstest]
#[case(json!({"opt": null}), false, "")]
#[case(json!({}), false, "")]
#[case(json!({"opt": {"name": "Ada"}}), true, "Ada")]
#[case(json!({"opt": "solo"}), true, "")]
fn test_select_on_single_values(#[case] data: Value, #[case] visible: bool, #[case] text: &str) {
    let mut doc = document(r#"<p data-jst-select="opt" data-jst-content="name"></p>"#);
    let p = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, data);
    assert_eq!(doc.is_visible(&p), visible);
    assert_eq!(doc.text_content(p), text);
}

#[test]
fn test_list_items_see_positional_variables() {
    let mut doc = document(
        r#"<ul><li data-jst-select="items" data-jst-content="$index + 1 + '/' + $length + ' ' + $this + ' of ' + $top.owner"></li></ul>"#,
    );
    let ul = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"owner": "me", "items": ["a", "b"]}));
    let texts: Vec<String> = doc
        .element_children(&ul)
        .into_iter()
        .map(|li| doc.text_content(li))
        .collect();
    assert_eq!(texts, vec!["1/2 a of me", "2/2 b of me"]);
}

#[test]
fn test_failed_evaluation_uses_default() {
    let mut doc = document(r#"<p data-jst-content="user.address.city"></p><i data-jst-content="missing"></i>"#);
    let mut engine = Engine::new();
    engine.set_global("$default", json!("n/a"));

    render(&mut engine, &mut doc, json!({"user": {}}));
    assert_eq!(
        doc.to_markup(),
        r#"<p data-jst-content="user.address.city">n/a</p><i data-jst-content="missing">n/a</i>"#
    );
}

#[test]
fn test_configured_default_and_prefix() {
    let config = EngineConfig::builder()
        .with_attribute_prefix("tpl-")
        .with_default_value(json!("?"))
        .build();
    let mut doc = document(r#"<p tpl-content="nope()"></p><p data-jst-content="x">raw</p>"#);
    let mut engine = Engine::with_config(config);

    render(&mut engine, &mut doc, json!({"x": 1}));
    assert_eq!(doc.to_markup(), r#"<p tpl-content="nope()">?</p><p data-jst-content="x">raw</p>"#);
}

#[test]
fn test_identical_nodes_share_annotations() {
    let mut doc = document(
        r#"<div><span data-jst-content="a"></span><span data-jst-content="a"></span><em data-jst-content="b"></em></div>"#,
    );
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"a": 1, "b": 2}));
    let stats = engine.annotation_stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 2, 2));
    assert_eq!(engine.compiler_stats().entries, 2);
}

#[test]
fn test_values_variables_properties_and_booleans() {
    let mut doc = document(
        r#"<input data-jst-values="$v=n * 2 | .style.color=c | checked=flag | disabled=!flag | title=$v">"#,
    );
    let input = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"n": 2, "c": "red", "flag": true}));
    assert_eq!(attr(&doc, input, "title"), Some("4".to_string()));
    assert_eq!(attr(&doc, input, "checked"), Some("checked".to_string()));
    assert_eq!(attr(&doc, input, "disabled"), None);
    assert_eq!(doc.properties(input).get("style"), Some(&json!({"color": "red"})));
}

#[test]
fn test_vars_are_visible_to_descendants() {
    let mut doc = document(
        r#"<section data-jst-vars="total=items.length"><p data-jst-content="'total: ' + total"></p></section>"#,
    );
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"items": [1, 2, 3]}));
    assert_eq!(doc.text_content(doc.root()), "total: 3");
}

#[test]
fn test_data_binding_fills_node_store() {
    let mut doc = document(r#"<div data-jst-data="count=items.length | first=items[0]"></div>"#);
    let div = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"items": ["a", "b"]}));
    assert_eq!(doc.data(div).get("count"), Some(&json!(2)));
    assert_eq!(doc.data(div).get("first"), Some(&json!("a")));
}

#[test]
fn test_eval_runs_statements_in_order() {
    let mut doc = document(r#"<p data-jst-eval="$a = x; $b = $a * 10" data-jst-content="$b"></p>"#);
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"x": 4}));
    assert_eq!(doc.text_content(doc.root()), "40");
}

#[test]
fn test_overwrite_false_keeps_existing_content() {
    let mut doc = document(
        r#"<p data-jst-content="x" data-jst-overwrite="false">keep</p><p data-jst-content="x" data-jst-overwrite="true">drop</p>"#,
    );
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"x": "new"}));
    assert_eq!(doc.text_content(doc.root()), "keepnew");
}

#[test]
fn test_content_accepts_markup() {
    let mut doc = document(r#"<div data-jst-content="html"></div>"#);
    let div = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"html": "<b>bold</b> text"}));
    assert_eq!(doc.element_children(&div).len(), 1);
    assert_eq!(doc.text_content(div), "bold text");
}

#[test]
fn test_content_stops_descent() {
    let mut doc = document(r#"<div data-jst-content="v"><b data-jst-content="w">old</b></div>"#);
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"v": "replaced", "w": "unused"}));
    assert_eq!(doc.to_markup(), r#"<div data-jst-content="v">replaced</div>"#);
}

#[test]
fn test_if_hides_and_skips_subtree() {
    let mut doc = document(r#"<div data-jst-if="on"><b data-jst-content="v"></b></div>"#);
    let div = first(&doc, doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"on": false, "v": "x"}));
    assert!(!doc.is_visible(&div));
    assert_eq!(doc.text_content(div), "");

    render(&mut engine, &mut doc, json!({"on": true, "v": "x"}));
    assert!(doc.is_visible(&div));
    assert_eq!(doc.text_content(div), "x");
}

#[test]
fn test_skip_leaves_children_untouched() {
    let mut doc = document(r#"<div data-jst-skip="frozen"><b data-jst-content="v">old</b></div>"#);
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"frozen": true, "v": "new"}));
    assert_eq!(doc.text_content(doc.root()), "old");

    render(&mut engine, &mut doc, json!({"frozen": false, "v": "new"}));
    assert_eq!(doc.text_content(doc.root()), "new");
}

#[test]
fn test_hide_and_show_only_act_when_truthy() {
    let mut doc = document(r#"<p data-jst-hide="h"></p><p data-jst-show="s" style="display:none"></p>"#);
    let nodes = doc.element_children(&doc.root());
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"h": true, "s": false}));
    assert!(!doc.is_visible(&nodes[0]));
    assert!(!doc.is_visible(&nodes[1]));

    render(&mut engine, &mut doc, json!({"h": false, "s": true}));
    assert!(!doc.is_visible(&nodes[0]));
    assert!(doc.is_visible(&nodes[1]));
}

#[test]
fn test_id_bindings() {
    let mut doc = document(
        r#"<ul><li data-jst-select="items" data-jst-idexpr="'item-' + key" data-jst-content="key"></li></ul><p data-jst-id="fixed" data-jst-idexpr="'ignored'"></p>"#,
    );
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"items": [{"key": 1}, {"key": 0}]}));
    let ul = first(&doc, doc.root());
    let ids: Vec<Option<String>> = doc
        .element_children(&ul)
        .into_iter()
        .map(|li| attr(&doc, li, "id"))
        .collect();
    assert_eq!(ids, vec![Some("item-1".to_string()), Some("item-0".to_string())]);
    let p = doc.element_children(&doc.root())[1];
    assert_eq!(attr(&doc, p, "id"), Some("fixed".to_string()));
}

#[test]
fn test_render_clone_strips_identity() {
    let mut doc = document(r#"<div id="card"><span id="title" data-jst-content="v"></span></div>"#);
    let card = first(&doc, doc.root());
    let mut engine = Engine::new();

    let copy = engine.render_clone(&mut doc, json!({"v": 1}), &card);
    assert_eq!(doc.outer_markup(copy), r#"<div><span data-jst-content="v">1</span></div>"#);
    assert!(!doc.is_attached(copy));
    assert_eq!(
        doc.to_markup(),
        r#"<div id="card"><span id="title" data-jst-content="v"></span></div>"#
    );
}

#[test]
fn test_render_with_parent_exposes_top() {
    let mut doc = document(r#"<p data-jst-content="$top.title + ': ' + name"></p>"#);
    let p = first(&doc, doc.root());
    let mut engine = Engine::new();

    engine.render_with_parent(
        &mut doc,
        json!({"name": "child"}),
        Some(json!({"title": "Parent"})),
        &p,
        true,
    );
    assert_eq!(doc.text_content(p), "Parent: child");
}

#[test]
fn test_callbacks_run_before_content() {
    let mut doc = document(r#"<p data-jst-content="$greeting"></p><i data-jst-content="'still'"></i>"#);
    let nodes = doc.element_children(&doc.root());
    doc.attach_callback(
        &nodes[0],
        Arc::new(|ctx: &mut EvalContext| -> TemplateResult<()> {
            let name = ctx.evaluate_expression("name");
            ctx.set_variable("$greeting", json!(format!("hi {}", name.as_str().unwrap_or(""))));
            Ok(())
        }),
    );
    doc.attach_callback(
        &nodes[1],
        Arc::new(|_: &mut EvalContext| -> TemplateResult<()> { Err(TemplateError::callback("boom")) }),
    );
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"name": "Ada"}));
    assert_eq!(doc.text_content(nodes[0]), "hi Ada");
    assert_eq!(doc.text_content(nodes[1]), "still");
}

#[test]
fn test_host_functions() {
    let mut doc = document(r#"<p data-jst-content="shout(name)"></p>"#);
    let mut engine = Engine::new();
    engine.register_function("shout", 1, Some(1), |args| {
        Ok(json!(format!("{}!", args[0].as_str().unwrap_or_default().to_uppercase())))
    });

    render(&mut engine, &mut doc, json!({"name": "hey"}));
    assert_eq!(doc.text_content(doc.root()), "HEY!");
}

#[test]
fn test_deep_trees_do_not_exhaust_the_stack() {
    let mut doc = Document::new();
    let mut parent = doc.root();
    for _ in 0..20_000 {
        let child = doc.create_element("div");
        doc.append_child(parent, child);
        parent = child;
    }
    let leaf = doc.create_element("span");
    doc.set_attribute(&leaf, "data-jst-content", "v");
    doc.append_child(parent, leaf);
    let mut engine = Engine::new();

    let root = doc.root();
    let stats = engine.render_in_place(&mut doc, json!({"v": "bottom"}), &root);
    assert!(stats.max_depth > 20_000);
    assert_eq!(doc.text_content(leaf), "bottom");
}

#[test]
fn test_engines_do_not_share_caches() {
    let mut doc = document(r#"<p data-jst-content="x"></p>"#);
    let mut first_engine = Engine::new();
    let second_engine = Engine::new();

    render(&mut first_engine, &mut doc, json!({"x": 1}));
    assert_eq!(first_engine.compiler_stats().entries, 1);
    assert_eq!(second_engine.compiler_stats().entries, 0);
    assert_eq!(second_engine.annotation_stats().entries, 0);
}

#[test]
fn test_engines_resolve_their_own_annotations() {
    let mut doc = document(r#"<p data-jst-content="a"></p><i data-jst-content="b"></i>"#);
    let nodes = doc.element_children(&doc.root());
    let (p, i) = (nodes[0], nodes[1]);
    let data = json!({"a": "A", "b": "B"});
    let mut first_engine = Engine::new();
    let mut second_engine = Engine::new();

    first_engine.render_in_place(&mut doc, data.clone(), &p);
    second_engine.render_in_place(&mut doc, data.clone(), &i);
    second_engine.render_in_place(&mut doc, data, &p);

    assert_eq!(doc.text_content(p), "A");
    assert_eq!(doc.text_content(i), "B");
    assert_eq!(second_engine.annotation_stats().entries, 2);
}

#[test]
fn test_clear_caches_rescans_rendered_nodes() {
    let mut doc = document(r#"<p data-jst-content="a"></p><i data-jst-content="b"></i>"#);
    let nodes = doc.element_children(&doc.root());
    let (p, i) = (nodes[0], nodes[1]);
    let mut engine = Engine::new();

    engine.render_in_place(&mut doc, json!({"a": "A1", "b": "B1"}), &p);
    engine.clear_caches();
    engine.render_in_place(&mut doc, json!({"a": "A2", "b": "B2"}), &i);
    engine.render_in_place(&mut doc, json!({"a": "A2", "b": "B2"}), &p);

    assert_eq!(doc.text_content(p), "A2");
    assert_eq!(doc.text_content(i), "B2");
}

#[test]
fn test_long_lists_render_in_linear_time() {
    let mut doc = document(r#"<ul><li data-jst-select="items" data-jst-content="name"></li></ul>"#);
    let ul = first(&doc, doc.root());
    let items: Vec<Value> = (0..10_000).map(|i| json!({"name": format!("row {i}")})).collect();
    let mut engine = Engine::new();

    let started = std::time::Instant::now();
    render(&mut engine, &mut doc, json!({"items": items}));
    let elapsed = started.elapsed();

    let rows = doc.element_children(&ul);
    assert_eq!(rows.len(), 10_000);
    assert_eq!(doc.text_content(rows[9_999]), "row 9999");
    assert!(elapsed < std::time::Duration::from_secs(5), "took {elapsed:?}");
}

#[test]
fn test_rerendering_reuses_document_storage() {
    let mut doc = document(
        r#"<div><p data-jst-content="v"></p><ul><li data-jst-select="items" data-jst-content="$this"></li></ul></div>"#,
    );
    let mut engine = Engine::new();

    render(&mut engine, &mut doc, json!({"v": 0, "items": [1, 2, 3]}));
    let settled = doc.node_count();
    for pass in 1..1_000 {
        let items: Vec<i32> = (0..(pass % 4)).collect();
        render(&mut engine, &mut doc, json!({"v": pass, "items": items}));
        render(&mut engine, &mut doc, json!({"v": pass, "items": [1, 2, 3]}));
    }
    assert_eq!(doc.node_count(), settled);
}
