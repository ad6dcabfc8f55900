//! Template lookup, transclusion and handles

use jstemplate::dom::{Document, NodeId};
use jstemplate::tree::Tree;
use jstemplate::{Engine, TemplateError};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const TEMPLATES: &str = r#"<div id="tpl" style="display:none"><b id="card" data-jst-content="title"></b><li id="row" data-jst-select="rows" data-jst-content="$this"></li></div>"#;

fn page(body: &str) -> (Document, NodeId) {
    let doc = Document::parse(&format!("{TEMPLATES}{body}")).expect("valid test markup");
    let main = doc.element_children(&doc.root())[1];
    (doc, main)
}

#[rstest]
#[case(r##"<main><i data-jst-include="#card"></i></main>"##)]
#[case(r#"<main><i data-jst-include="kind"></i></main>"#)]
fn test_include_replaces_node_with_rendered_copy(#[case] body: &str) {
    let (mut doc, main) = page(body);
    let mut engine = Engine::new();

    engine.render_in_place(&mut doc, json!({"kind": "card", "title": "Hello"}), &main);
    assert_eq!(doc.outer_markup(main), r#"<main><b data-jst-content="title">Hello</b></main>"#);
    assert_eq!(doc.text_content(doc.element_children(&doc.root())[0]), "");
}

#[test]
fn test_include_of_missing_template_removes_node() {
    let (mut doc, main) = page(r##"<main><i data-jst-include="#nope"></i><i data-jst-include="kind"></i></main>"##);
    let mut engine = Engine::new();

    engine.render_in_place(&mut doc, json!({"kind": null}), &main);
    assert_eq!(doc.outer_markup(main), "<main></main>");
}

#[test]
fn test_included_template_can_multiply() {
    let (mut doc, main) = page(r##"<main><ul><x data-jst-include="#row"></x></ul></main>"##);
    let mut engine = Engine::new();

    engine.render_in_place(&mut doc, json!({"rows": [1, 2]}), &main);
    assert_eq!(
        doc.outer_markup(main),
        r#"<main><ul><li data-jst-select="rows" data-jst-content="$this">1</li><li data-jst-select="rows" data-jst-content="$this">2</li></ul></main>"#
    );
}

#[test]
fn test_loader_materializes_missing_templates_once() {
    let mut doc = Document::parse(r##"<main><i data-jst-include="#remote"></i><i data-jst-include="#remote"></i></main>"##)
        .expect("valid test markup");
    let main = doc.element_children(&doc.root())[0];
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut engine = Engine::new();
    engine.set_template_loader(move |reference: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        (reference == "remote").then(|| r#"<em id="remote" data-jst-content="x"></em>"#.to_string())
    });

    engine.render_in_place(&mut doc, json!({"x": 1}), &main);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        doc.to_markup(),
        concat!(
            r#"<main><em data-jst-content="x">1</em><em data-jst-content="x">1</em></main>"#,
            r#"<div id="js-templates" style="display:none"><em id="remote" data-jst-content="x"></em></div>"#
        )
    );
}

#[test]
fn test_loader_without_matching_id_yields_nothing() {
    let mut doc = Document::parse("<main></main>").expect("valid test markup");
    let mut engine = Engine::new();
    engine.set_template_loader(|_: &str| Some(r#"<p id="other"></p>"#.to_string()));

    assert_eq!(engine.resolve_template(&mut doc, "wanted"), None);
    engine.clear_template_loader();
    let other = engine
        .find_template(&mut doc, "other")
        .expect("loaded markup stays in the container");
    assert_eq!(doc.tag_name(other), Some("p"));
}

#[test]
fn test_resolve_or_fail() {
    let (mut doc, _) = page("<main></main>");
    let mut engine = Engine::new();

    let copy = engine
        .resolve_template_or_fail(&mut doc, "card")
        .expect("template exists");
    assert_eq!(doc.outer_markup(copy), r#"<b data-jst-content="title"></b>"#);
    assert!(!doc.is_attached(copy));

    assert_eq!(
        engine.resolve_template_or_fail(&mut doc, "nope"),
        Err(TemplateError::template_not_found("nope"))
    );
}

#[test]
fn test_inplace_handle_keeps_identity() {
    let (mut doc, _) = page("<main></main>");
    let mut engine = Engine::new();

    let handle = engine.get_template(&mut doc, "card");
    assert!(handle.is_inplace());
    handle.process(&mut engine, &mut doc, json!({"title": "Live"}));

    let card = *handle.node().expect("card exists");
    assert_eq!(doc.outer_markup(card), r#"<b id="card" data-jst-content="title">Live</b>"#);
}

#[test]
fn test_cloned_handle_renders_detached_copy() {
    let (mut doc, _) = page("<main></main>");
    let mut engine = Engine::new();
    let before = doc.to_markup();

    let handle = engine.clone_template(&mut doc, "card");
    assert!(!handle.is_inplace());
    handle.process(&mut engine, &mut doc, json!({"title": "Copy"}));

    let copy = *handle.node().expect("card exists");
    assert_eq!(doc.outer_markup(copy), r#"<b data-jst-content="title">Copy</b>"#);
    assert_eq!(doc.to_markup(), before);
}

#[test]
fn test_handle_over_missing_template_is_inert() {
    let (mut doc, _) = page("<main></main>");
    let mut engine = Engine::new();

    let handle = engine.get_template(&mut doc, "missing");
    assert_eq!(handle.node(), None);
    handle.process(&mut engine, &mut doc, json!({"title": "x"}));
    assert_eq!(doc.mutations(), 0);
}
