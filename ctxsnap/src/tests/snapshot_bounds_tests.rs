use crate::dom::{Document, NodeId};
use crate::identity::*;
use crate::ownership::extract_ownership_path;

fn assert_within_bounds(snapshot: &ElementSnapshot) {
    assert!(snapshot.text_content.chars().count() <= MAX_TEXT_LENGTH);
    assert!(snapshot.class_name.chars().count() <= MAX_ATTRIBUTE_VALUE_LENGTH);
    assert!(snapshot.html_preview.chars().count() <= MAX_HTML_PREVIEW_LENGTH);
    assert!(snapshot.attributes.len() <= MAX_ATTRIBUTES);
    assert!(snapshot
        .attributes
        .values()
        .all(|v| v.chars().count() <= MAX_ATTRIBUTE_VALUE_LENGTH));
    assert!(snapshot.accessibility.len() <= MAX_ACCESSIBILITY_ENTRIES);
    assert!(snapshot.computed_styles.len() <= STYLE_ALLOW_LIST.len());
    assert!(snapshot.xpath.split('/').filter(|s| !s.is_empty()).count() <= MAX_PATH_SEGMENTS);
    assert!(snapshot.selector.split(" > ").count() <= MAX_SELECTOR_SEGMENTS);

    let ctx = &snapshot.dom_context;
    assert!(ctx.parents.len() <= MAX_CONTEXT_PARENTS);
    assert!(ctx
        .parents
        .iter()
        .all(|p| p.html_preview.chars().count() <= MAX_HTML_PREVIEW_LENGTH));
    for sibling in [&ctx.previous_sibling, &ctx.next_sibling].into_iter().flatten() {
        assert!(sibling.chars().count() <= MAX_SIBLING_DESCRIPTOR_LENGTH);
    }
}

/// An element with far more of everything than a report may carry
fn oversized(doc: &mut Document, parent: NodeId) -> NodeId {
    let long = "x".repeat(1_000);
    let classes = (0..60).map(|i| format!("card{i}")).collect::<Vec<_>>().join(" ");
    let el = doc.append_element(parent, "section", &[("class", classes.as_str())]);
    for i in 0..50 {
        doc.set_attribute(el, &format!("data-field-{i}"), &long);
    }
    for i in 0..40 {
        doc.set_attribute(el, &format!("aria-x{i}"), "y");
    }
    doc.append_element(parent, "p", &[("class", long.as_str())]);
    for _ in 0..200 {
        let child = doc.append_element(el, "div", &[]);
        doc.append_text(child, "lorem ipsum dolor sit amet ");
    }
    el
}

#[test]
fn test_connected_element_is_bounded() {
    let (mut doc, body) = Document::with_html_body();
    let mut parent = body;
    for _ in 0..80 {
        parent = doc.append_element(parent, "div", &[]);
    }
    let el = oversized(&mut doc, parent);

    let snapshot = extract_element_snapshot(&doc, el);
    assert_within_bounds(&snapshot);
    assert!(snapshot.is_connected);
    assert_eq!(snapshot.dom_context.child_count, 200);
    assert!(snapshot.text_content.ends_with("..."));
}

#[test]
fn test_detached_element_is_bounded() {
    let (mut doc, body) = Document::with_html_body();
    let wrapper = doc.append_element(body, "div", &[("id", "gone")]);
    let el = oversized(&mut doc, wrapper);
    doc.detach(wrapper);

    let snapshot = extract_element_snapshot(&doc, el);
    assert_within_bounds(&snapshot);
    assert!(!snapshot.is_connected);
    assert_eq!(snapshot.xpath, "/div[1]/section[1]");
    assert_eq!(snapshot.selector, "#gone > section.card0.card1");
    assert!(extract_ownership_path(None, &doc, el).is_empty());
}

#[test]
fn test_foreign_namespace_element() {
    let (mut doc, body) = Document::with_html_body();
    let svg = doc.append_element(body, "svg", &[("viewBox", "0 0 10 10")]);
    doc.set_namespace(svg, "http://www.w3.org/2000/svg");
    let path = doc.append_element(svg, "path", &[("d", "M0 0L10 10")]);

    let snapshot = extract_element_snapshot(&doc, path);
    assert_within_bounds(&snapshot);
    assert_eq!(snapshot.tag_name, "path");
    assert_eq!(snapshot.xpath, "/html[1]/body[1]/svg[1]/path[1]");
    let parent = extract_element_snapshot(&doc, svg);
    assert_eq!(parent.namespace.as_deref(), Some("http://www.w3.org/2000/svg"));
}

#[test]
fn test_huge_sibling_list_is_described_from_its_first_rows() {
    let (mut doc, body) = Document::with_html_body();
    let list = doc.append_element(body, "ul", &[]);
    for i in 0..10_000 {
        let row = doc.append_element(list, "li", &[]);
        doc.append_text(row, &format!("\n  row {i}  "));
    }
    let button = doc.append_element(body, "button", &[]);
    doc.append_text(button, "Load more");

    let snapshot = extract_element_snapshot(&doc, button);
    assert_within_bounds(&snapshot);
    assert_eq!(
        snapshot.dom_context.previous_sibling.as_deref(),
        Some("ul \"row 0 row 1 row 2 row 3 row...\"")
    );

    let page = extract_element_snapshot(&doc, body);
    assert_within_bounds(&page);
    assert!(page.text_content.starts_with("row 0 row 1 row 2"));
    assert!(page.text_content.ends_with("..."));
    assert_eq!(describe_element(&doc, list), "ul \"row 0 row 1 row 2 row 3 row...\"");
}
