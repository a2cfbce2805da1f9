//! Identity extraction: the DOM facts that pin down one element.
//!
//! Every sub-extraction is independent. A missing node, a detached subtree or
//! a foreign-namespace element only ever degrades an individual field to its
//! empty default; [`extract_element_snapshot`] itself cannot fail.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::dom::{Document, ElementData, NodeId};
use crate::value::truncate_chars;

// ============================================================================
// Limits
// ============================================================================

pub const MAX_TEXT_LENGTH: usize = 100;
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 100;
pub const MAX_HTML_PREVIEW_LENGTH: usize = 300;
pub const MAX_ATTRIBUTES: usize = 30;
pub const MAX_ACCESSIBILITY_ENTRIES: usize = 20;
pub const MAX_CONTEXT_PARENTS: usize = 3;
pub const MAX_SIBLING_DESCRIPTOR_LENGTH: usize = 80;
const SIBLING_TEXT_LENGTH: usize = 30;
pub const MAX_SELECTOR_SEGMENTS: usize = 4;
pub const MAX_SELECTOR_CLASSES: usize = 2;
pub const MAX_PATH_SEGMENTS: usize = 64;

/// Attributes that identify an element for tests, highest priority first
pub const TEST_ID_ATTRIBUTES: &[&str] = &["data-testid", "data-test", "data-cy"];

/// Attribute stamped by the UI framework itself
pub const FRAMEWORK_ID_ATTRIBUTE: &str = "data-reactid";

/// Attributes written by the capture overlay; never reported
pub const INTERNAL_ATTRIBUTE_PREFIX: &str = "data-ctxsnap";

/// Presentation properties worth reporting, with the value that means
/// "nothing interesting here". Order is the report order.
pub const STYLE_ALLOW_LIST: &[(&str, &str)] = &[
    ("display", "inline"),
    ("position", "static"),
    ("top", "auto"),
    ("right", "auto"),
    ("bottom", "auto"),
    ("left", "auto"),
    ("width", "auto"),
    ("height", "auto"),
    ("margin", "0px"),
    ("padding", "0px"),
    ("border", "none"),
    ("border-radius", "0px"),
    ("color", "rgb(0, 0, 0)"),
    ("background-color", "rgba(0, 0, 0, 0)"),
    ("font-family", ""),
    ("font-size", "16px"),
    ("font-weight", "400"),
    ("line-height", "normal"),
    ("text-align", "start"),
    ("opacity", "1"),
    ("visibility", "visible"),
    ("overflow", "visible"),
    ("z-index", "auto"),
    ("flex-direction", "row"),
    ("justify-content", "normal"),
    ("align-items", "normal"),
    ("gap", "normal"),
    ("cursor", "auto"),
    ("box-shadow", "none"),
    ("transform", "none"),
];

static UTILITY_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(?:
            [a-z]+:.*                                   # variants: hover:, md:, dark:
          | -?[mp][trblxyse]?-.+                        # spacing
          | (?:min-|max-)?[wh]-.+                       # sizing
          | (?:text|bg|border|rounded|shadow|font|leading|tracking|ring|outline|opacity|z|gap|space|divide|inset|top|left|right|bottom|order|col|row|grid|flex|items|justify|self|place|content|overflow|cursor|transition|duration|ease|delay|animate|translate|scale|rotate|skew|origin|fill|stroke)-.+
          | flex|grid|block|inline|inline-block|inline-flex|hidden|contents|table|relative|absolute|fixed|sticky|static|truncate|italic|underline|uppercase|lowercase|capitalize|sr-only|container
          | css-[a-z0-9]+                               # emotion hashes
          | sc-[a-zA-Z0-9]+                             # styled-components hashes
          | jsx-\d+                                     # styled-jsx
        )$",
    )
    .expect("utility class pattern is valid")
});

// ============================================================================
// Snapshot types
// ============================================================================

/// Bounding rectangle rounded to whole pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// One ancestor level in the DOM context summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentSummary {
    pub tag_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub html_preview: String,
}

/// Where the element sits among its neighbours
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomContext {
    pub parents: Vec<ParentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_sibling: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_sibling: Option<String>,
    pub child_count: usize,
}

/// Everything the report knows about the selected element itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub tag_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub class_name: String,
    pub text_content: String,
    pub attributes: BTreeMap<String, String>,
    pub bounding_rect: BoundingRect,
    pub selector: String,
    pub xpath: String,
    #[serde(with = "ordered_map")]
    pub computed_styles: Vec<(String, String)>,
    pub html_preview: String,
    pub dom_context: DomContext,
    pub accessibility: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub is_connected: bool,
}

// ============================================================================
// Extraction
// ============================================================================

/// Build the snapshot for `id`. Never fails; unknown nodes yield defaults.
pub fn extract_element_snapshot(doc: &Document, id: NodeId) -> ElementSnapshot {
    let Some(el) = doc.element(id) else {
        debug!(target: "ctxsnap::identity", node = id.0, "not an element; returning empty snapshot");
        return ElementSnapshot::default();
    };

    ElementSnapshot {
        tag_name: el.tag.clone(),
        id: el
            .id()
            .map(|v| truncate_chars(v, MAX_ATTRIBUTE_VALUE_LENGTH)),
        class_name: truncate_chars(el.class_name(), MAX_ATTRIBUTE_VALUE_LENGTH),
        text_content: extract_text(doc, id),
        attributes: extract_attributes(el),
        bounding_rect: extract_rect(el),
        selector: generate_selector(doc, id),
        xpath: absolute_path(doc, id),
        computed_styles: filter_computed_styles(&el.computed_style),
        html_preview: truncate_chars(
            &doc.inner_html_limited(id, MAX_HTML_PREVIEW_LENGTH + 1),
            MAX_HTML_PREVIEW_LENGTH,
        ),
        dom_context: extract_dom_context(doc, id),
        accessibility: extract_accessibility(el),
        namespace: el.namespace.clone(),
        is_connected: doc.is_connected(id),
    }
}

fn extract_text(doc: &Document, id: NodeId) -> String {
    truncate_chars(&doc.text_content_limited(id, MAX_TEXT_LENGTH + 1), MAX_TEXT_LENGTH)
}

fn extract_attributes(el: &ElementData) -> BTreeMap<String, String> {
    el.attributes
        .iter()
        .filter(|(name, _)| name != "style" && !name.starts_with(INTERNAL_ATTRIBUTE_PREFIX))
        .take(MAX_ATTRIBUTES)
        .map(|(name, value)| {
            (
                name.clone(),
                truncate_chars(value, MAX_ATTRIBUTE_VALUE_LENGTH),
            )
        })
        .collect()
}

fn extract_rect(el: &ElementData) -> BoundingRect {
    let Some(rect) = el.rect else {
        return BoundingRect::default();
    };
    BoundingRect {
        x: round_px(rect.x),
        y: round_px(rect.y),
        width: round_px(rect.width),
        height: round_px(rect.height),
    }
}

fn round_px(v: f64) -> i64 {
    if v.is_finite() {
        v.round() as i64
    } else {
        0
    }
}

fn extract_accessibility(el: &ElementData) -> BTreeMap<String, String> {
    el.attributes
        .iter()
        .filter(|(name, _)| {
            name.starts_with("aria-")
                || matches!(name.as_str(), "role" | "tabindex" | "alt" | "title" | "for")
        })
        .take(MAX_ACCESSIBILITY_ENTRIES)
        .map(|(name, value)| {
            (
                name.clone(),
                truncate_chars(value, MAX_ATTRIBUTE_VALUE_LENGTH),
            )
        })
        .collect()
}

// ============================================================================
// Selector generation
// ============================================================================

/// A stable CSS selector for the element.
///
/// Anchors (test ids, element ids, framework ids) short-circuit the walk.
/// Otherwise segments are built from tag and meaningful classes, with
/// `:nth-of-type` when same-tag siblings exist, walking up until an anchored
/// ancestor, the document root, or [`MAX_SELECTOR_SEGMENTS`].
pub fn generate_selector(doc: &Document, id: NodeId) -> String {
    let Some(el) = doc.element(id) else {
        return String::new();
    };
    if let Some(anchor) = anchor_selector(el) {
        return anchor;
    }

    let mut segments: Vec<String> = Vec::new();
    let mut current = Some(id);
    while let Some(node) = current {
        if segments.len() >= MAX_SELECTOR_SEGMENTS {
            break;
        }
        let Some(data) = doc.element(node) else {
            break;
        };
        if node != id {
            if let Some(anchor) = anchor_selector(data) {
                segments.push(anchor);
                break;
            }
            if data.tag == "html" {
                break;
            }
        }
        segments.push(segment_selector(doc, node, data));
        current = doc.parent_element(node);
    }

    segments.reverse();
    segments.join(" > ")
}

fn anchor_selector(el: &ElementData) -> Option<String> {
    for attr in TEST_ID_ATTRIBUTES {
        if let Some(value) = el.attr(attr).filter(|v| !v.is_empty()) {
            return Some(format!("[{}=\"{}\"]", attr, escape_attr_value(value)));
        }
    }
    if let Some(id) = el.id() {
        return Some(format!("#{}", css_escape(id)));
    }
    el.attr(FRAMEWORK_ID_ATTRIBUTE)
        .filter(|v| !v.is_empty())
        .map(|value| {
            format!(
                "[{}=\"{}\"]",
                FRAMEWORK_ID_ATTRIBUTE,
                escape_attr_value(value)
            )
        })
}

fn segment_selector(doc: &Document, node: NodeId, el: &ElementData) -> String {
    let mut segment = el.tag.clone();
    for class in meaningful_classes(el) {
        segment.push('.');
        segment.push_str(&css_escape(class));
    }

    if let Some(parent) = doc.parent_element(node) {
        let same_tag: Vec<NodeId> = doc
            .element_children(parent)
            .into_iter()
            .filter(|c| doc.element(*c).map(|d| d.tag == el.tag).unwrap_or(false))
            .collect();
        if same_tag.len() > 1 {
            if let Some(pos) = same_tag.iter().position(|c| *c == node) {
                segment.push_str(&format!(":nth-of-type({})", pos + 1));
            }
        }
    }
    segment
}

/// Classes that say something about the element, skipping utility classes
/// and generated hashes
pub fn meaningful_classes(el: &ElementData) -> Vec<&str> {
    el.classes()
        .filter(|c| c.chars().count() >= 3 && !is_utility_class(c))
        .take(MAX_SELECTOR_CLASSES)
        .collect()
}

pub fn is_utility_class(class: &str) -> bool {
    UTILITY_CLASS.is_match(class)
}

/// Minimal CSS identifier escaping
pub fn css_escape(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, ch) in ident.chars().enumerate() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii() {
            if i == 0 && ch.is_ascii_digit() {
                out.push_str(&format!("\\{:x} ", ch as u32));
            } else {
                out.push(ch);
            }
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    out
}

fn escape_attr_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

// ============================================================================
// Absolute path
// ============================================================================

/// `/html[1]/body[1]/div[2]/button[1]` style path; every segment carries its
/// 1-based index among same-tag siblings
pub fn absolute_path(doc: &Document, id: NodeId) -> String {
    let mut segments = Vec::new();
    let mut current = doc.element(id).map(|_| id);
    while let Some(node) = current {
        if segments.len() >= MAX_PATH_SEGMENTS {
            break;
        }
        let Some(el) = doc.element(node) else {
            break;
        };
        let mut index = 1;
        let mut sibling = doc.previous_element_sibling(node);
        while let Some(s) = sibling {
            if doc.element(s).map(|d| d.tag == el.tag).unwrap_or(false) {
                index += 1;
            }
            sibling = doc.previous_element_sibling(s);
        }
        segments.push(format!("{}[{}]", el.tag, index));
        current = doc.parent_element(node);
    }

    if segments.is_empty() {
        return String::new();
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

// ============================================================================
// Computed styles
// ============================================================================

/// Keep allow-listed properties whose value differs from the default
pub fn filter_computed_styles(styles: &BTreeMap<String, String>) -> Vec<(String, String)> {
    STYLE_ALLOW_LIST
        .iter()
        .filter_map(|(property, default)| {
            let value = styles.get(*property)?.trim();
            if value.is_empty() || value == *default || is_uninteresting_style(property, value) {
                return None;
            }
            Some((property.to_string(), value.to_string()))
        })
        .collect()
}

fn is_uninteresting_style(property: &str, value: &str) -> bool {
    if property.starts_with("margin") || property.starts_with("padding") || property == "gap" {
        return value
            .split_whitespace()
            .all(|token| token == "0" || token == "0px");
    }
    if property.starts_with("background") {
        return value == "transparent" || value == "rgba(0, 0, 0, 0)";
    }
    if property.starts_with("border") && property != "border-radius" {
        return value.split_whitespace().any(|token| token == "none");
    }
    false
}

// ============================================================================
// DOM context
// ============================================================================

fn extract_dom_context(doc: &Document, id: NodeId) -> DomContext {
    let mut parents = Vec::new();
    let mut current = doc.parent_element(id);
    while let Some(node) = current {
        if parents.len() >= MAX_CONTEXT_PARENTS {
            break;
        }
        let Some(el) = doc.element(node) else {
            break;
        };
        parents.push(ParentSummary {
            tag_name: el.tag.clone(),
            id: el
                .id()
                .map(|v| truncate_chars(v, MAX_ATTRIBUTE_VALUE_LENGTH)),
            class_name: Some(el.class_name())
                .filter(|c| !c.is_empty())
                .map(|c| truncate_chars(c, MAX_ATTRIBUTE_VALUE_LENGTH)),
            html_preview: truncate_chars(
                &doc.outer_html_limited(node, MAX_HTML_PREVIEW_LENGTH + 1),
                MAX_HTML_PREVIEW_LENGTH,
            ),
        });
        current = doc.parent_element(node);
    }

    DomContext {
        parents,
        previous_sibling: doc
            .previous_element_sibling(id)
            .map(|s| describe_element(doc, s)),
        next_sibling: doc
            .next_element_sibling(id)
            .map(|s| describe_element(doc, s)),
        child_count: doc.element_children(id).len(),
    }
}

/// Single-line descriptor such as `button#save.primary "Save"`
pub fn describe_element(doc: &Document, id: NodeId) -> String {
    let Some(el) = doc.element(id) else {
        return String::new();
    };
    let mut out = el.tag.clone();
    if let Some(element_id) = el.id() {
        out.push('#');
        out.push_str(element_id);
    }
    for class in el.classes().take(MAX_SELECTOR_CLASSES) {
        out.push('.');
        out.push_str(class);
    }
    let text = doc.text_content_limited(id, SIBLING_TEXT_LENGTH + 1);
    if !text.is_empty() {
        out.push_str(&format!(" \"{}\"", truncate_chars(&text, SIBLING_TEXT_LENGTH)));
    }
    truncate_chars(&out, MAX_SIBLING_DESCRIPTOR_LENGTH)
}

// ============================================================================
// Ordered map serialization for computed styles
// ============================================================================

mod ordered_map {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(entries: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of property names to values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    out.push((k, v));
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}
