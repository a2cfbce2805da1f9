use crate::dom::{Document, DomRect, NodeId};
use crate::identity::*;
use crate::tests::init_tracing;

/// `html > body > div.toolbar > [button "Cancel", button#save-btn "Save"]`
fn toolbar() -> (Document, NodeId, NodeId) {
    let (mut doc, body) = Document::with_html_body();
    let toolbar = doc.append_element(body, "div", &[("class", "toolbar")]);
    let cancel = doc.append_element(toolbar, "button", &[("class", "btn secondary")]);
    doc.append_text(cancel, "Cancel");
    let save = doc.append_element(
        toolbar,
        "button",
        &[("id", "save-btn"), ("class", "btn primary px-4"), ("aria-label", "Save changes")],
    );
    doc.append_text(save, "Save");
    (doc, cancel, save)
}

#[test]
fn test_id_short_circuits_selector_walk() {
    init_tracing();
    let (doc, _, save) = toolbar();

    assert_eq!(generate_selector(&doc, save), "#save-btn");

    let xpath = absolute_path(&doc, save);
    assert_eq!(xpath, "/html[1]/body[1]/div[1]/button[2]");
    assert_eq!(xpath.trim_start_matches('/').split('/').count(), 4);
}

#[test]
fn test_test_id_wins_over_id() {
    let (mut doc, body) = Document::with_html_body();
    let el = doc.append_element(body, "input", &[("id", "email"), ("data-testid", "login-email")]);
    assert_eq!(generate_selector(&doc, el), "[data-testid=\"login-email\"]");

    let framework = doc.append_element(body, "span", &[("data-reactid", ".0.1")]);
    assert_eq!(generate_selector(&doc, framework), "[data-reactid=\".0.1\"]");
}

#[test]
fn test_selector_uses_classes_and_nth_of_type() {
    let (doc, cancel, _) = toolbar();
    assert_eq!(
        generate_selector(&doc, cancel),
        "body > div.toolbar > button.btn.secondary:nth-of-type(1)"
    );
}

#[test]
fn test_selector_stops_at_anchored_ancestor() {
    let (mut doc, body) = Document::with_html_body();
    let main = doc.append_element(body, "main", &[("id", "content")]);
    let section = doc.append_element(main, "section", &[("class", "mt-4 flex")]);
    let link = doc.append_element(section, "a", &[("class", "nav-link")]);
    assert_eq!(generate_selector(&doc, link), "#content > section > a.nav-link");
}

#[test]
fn test_selector_depth_is_bounded() {
    let (mut doc, body) = Document::with_html_body();
    let mut parent = body;
    for _ in 0..10 {
        parent = doc.append_element(parent, "div", &[("class", "wrapper")]);
    }
    let leaf = doc.append_element(parent, "span", &[]);
    let selector = generate_selector(&doc, leaf);
    assert_eq!(selector.split(" > ").count(), MAX_SELECTOR_SEGMENTS);
    assert!(selector.ends_with("span"));
}

#[test]
fn test_utility_classes_are_skipped() {
    for class in ["px-4", "mt-2", "flex", "text-sm", "bg-blue-500", "hover:bg-red-100", "css-1x2y3z", "sc-abc"] {
        assert!(is_utility_class(class), "{class} should be a utility class");
    }
    for class in ["toolbar", "primary", "nav-link", "card-header"] {
        assert!(!is_utility_class(class), "{class} should be kept");
    }
}

#[test]
fn test_snapshot_of_selected_button() {
    let (mut doc, _, save) = toolbar();
    doc.set_rect(save, DomRect::new(10.4, 20.6, 80.5, 32.0));
    doc.set_style(save, "display", "inline-block");
    doc.set_style(save, "margin", "0px");
    doc.set_style(save, "background-color", "rgb(0, 100, 200)");
    doc.set_attribute(save, "style", "color: red");

    let snapshot = extract_element_snapshot(&doc, save);
    assert_eq!(snapshot.tag_name, "button");
    assert_eq!(snapshot.id.as_deref(), Some("save-btn"));
    assert_eq!(snapshot.text_content, "Save");
    assert!(!snapshot.attributes.contains_key("style"));
    assert_eq!(snapshot.bounding_rect.x, 10);
    assert_eq!(snapshot.bounding_rect.y, 21);
    assert_eq!(snapshot.bounding_rect.height, 32);
    assert_eq!(
        snapshot.accessibility.get("aria-label").map(String::as_str),
        Some("Save changes")
    );
    assert!(snapshot
        .computed_styles
        .iter()
        .any(|(k, v)| k == "background-color" && v == "rgb(0, 100, 200)"));
    assert!(!snapshot.computed_styles.iter().any(|(k, _)| k == "margin"));

    let ctx = &snapshot.dom_context;
    assert_eq!(ctx.parents.len(), 3);
    assert_eq!(ctx.parents[0].tag_name, "div");
    assert_eq!(ctx.previous_sibling.as_deref(), Some("button.btn.secondary \"Cancel\""));
    assert_eq!(ctx.next_sibling, None);
    assert_eq!(ctx.child_count, 0);
    assert!(snapshot.is_connected);
}

#[test]
fn test_text_node_yields_default_snapshot() {
    let (mut doc, body) = Document::with_html_body();
    let text = doc.append_text(body, "hello");
    let snapshot = extract_element_snapshot(&doc, text);
    assert_eq!(snapshot, ElementSnapshot::default());
    assert_eq!(generate_selector(&doc, text), "");
    assert_eq!(absolute_path(&doc, text), "");
}
