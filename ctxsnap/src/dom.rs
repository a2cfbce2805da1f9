//! In-memory document model the identity extractor reads from.
//!
//! Hosts mirror the live page into a [`Document`]: an arena of element and
//! text nodes addressed by [`NodeId`]. Elements carry whatever the host could
//! resolve (computed style, geometry, runtime back-references); anything
//! missing simply reads back as empty.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of a node inside its [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Layout rectangle in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DomRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DomRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Element payload of a node
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    /// Lower-case tag name
    pub tag: String,
    /// Namespace URI for foreign content (svg, mathml)
    pub namespace: Option<String>,
    /// Attributes in source order
    pub attributes: Vec<(String, String)>,
    /// Resolved presentation properties, as the host computed them
    pub computed_style: BTreeMap<String, String>,
    pub rect: Option<DomRect>,
    /// Runtime-attached back-references (property name -> opaque handle)
    pub runtime_refs: BTreeMap<String, usize>,
}

impl ElementData {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn class_name(&self) -> &str {
        self.attr("class").unwrap_or("")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.class_name().split_whitespace()
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena-backed document
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

/// Elements that never have children when serialized
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an `html` root with an empty `body`; returns the body
    pub fn with_html_body() -> (Self, NodeId) {
        let mut doc = Self::new();
        let html = doc.create_element("html");
        doc.set_root(html);
        let body = doc.create_element("body");
        doc.append_child(html, body);
        (doc, body)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id)?.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Append `child` to `parent`, detaching it from any previous parent
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return;
        }
        // refuse to create a cycle
        let mut ancestor = self.parent(parent);
        while let Some(node) = ancestor {
            if node == child {
                return;
            }
            ancestor = self.parent(node);
        }
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Remove a node from its parent; it keeps its own subtree
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).and_then(|n| n.parent) else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != id);
        self.nodes[id.0].parent = None;
    }

    /// Convenience: create an element with attributes and append it
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> NodeId {
        let id = self.create_element(tag);
        for (name, value) in attributes {
            self.set_attribute(id, name, value);
        }
        self.append_child(parent, id);
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            let name = name.to_ascii_lowercase();
            match el.attributes.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => el.attributes.push((name, value.to_string())),
            }
        }
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            el.computed_style
                .insert(property.to_string(), value.to_string());
        }
    }

    pub fn set_rect(&mut self, id: NodeId, rect: DomRect) {
        if let Some(el) = self.element_mut(id) {
            el.rect = Some(rect);
        }
    }

    pub fn set_namespace(&mut self, id: NodeId, namespace: &str) {
        if let Some(el) = self.element_mut(id) {
            el.namespace = Some(namespace.to_string());
        }
    }

    pub fn attach_runtime_ref(&mut self, id: NodeId, key: &str, handle: usize) {
        if let Some(el) = self.element_mut(id) {
            el.runtime_refs.insert(key.to_string(), handle);
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    /// Nearest ancestor that is an element
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.element(parent).map(|_| parent)
    }

    /// Element children only
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|c| self.element(*c).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.element_children(self.parent(id)?);
        let pos = siblings.iter().position(|s| *s == id)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.element_children(self.parent(id)?);
        let pos = siblings.iter().position(|s| *s == id)?;
        siblings.get(pos + 1).copied()
    }

    /// True when the node is reachable from the document root
    pub fn is_connected(&self, id: NodeId) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        let mut current = Some(id);
        let mut guard = 0;
        while let Some(node) = current {
            if node == root {
                return true;
            }
            guard += 1;
            if guard > self.nodes.len() {
                return false;
            }
            current = self.parent(node);
        }
        false
    }

    /// Descendant text with whitespace runs collapsed to single spaces,
    /// at most `max_chars` characters. The walk stops as soon as the budget
    /// is spent or [`MAX_TEXT_WALK_NODES`] nodes have been visited.
    pub fn text_content_limited(&self, id: NodeId, max_chars: usize) -> String {
        let mut budget = TextBudget {
            out: String::new(),
            chars: 0,
            max_chars,
            visited: 0,
            pending_space: false,
        };
        self.collect_text(id, &mut budget, 0);
        budget.out
    }

    fn collect_text(&self, id: NodeId, budget: &mut TextBudget, depth: usize) {
        if depth > 256 || budget.is_spent() {
            return;
        }
        let Some(node) = self.node(id) else {
            return;
        };
        budget.visited += 1;
        match &node.kind {
            NodeKind::Text(text) => budget.push_text(text),
            NodeKind::Element(_) => {
                for child in &node.children {
                    if budget.is_spent() {
                        return;
                    }
                    self.collect_text(*child, budget, depth + 1);
                }
            }
        }
    }

    /// Serialized markup of the node's children
    pub fn inner_html(&self, id: NodeId) -> String {
        self.inner_html_limited(id, usize::MAX)
    }

    /// Serialized markup of the node itself
    pub fn outer_html(&self, id: NodeId) -> String {
        self.outer_html_limited(id, usize::MAX)
    }

    /// Like [`Document::inner_html`] but stops writing once `limit` bytes
    /// have been produced, so previews of huge subtrees stay cheap
    pub fn inner_html_limited(&self, id: NodeId, limit: usize) -> String {
        let mut out = String::new();
        if let Some(node) = self.node(id) {
            for child in &node.children {
                if out.len() >= limit {
                    break;
                }
                self.write_html(*child, &mut out, 0, limit);
            }
        }
        out
    }

    pub fn outer_html_limited(&self, id: NodeId, limit: usize) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out, 0, limit);
        out
    }

    /// Just the opening tag, e.g. `<div id="a" class="b">`
    pub fn open_tag(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(el) = self.element(id) {
            write_open_tag(el, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String, depth: usize, limit: usize) {
        if depth > 256 || out.len() >= limit {
            return;
        }
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Element(el) => {
                write_open_tag(el, out);
                if VOID_TAGS.contains(&el.tag.as_str()) {
                    return;
                }
                for child in &node.children {
                    if out.len() >= limit {
                        return;
                    }
                    self.write_html(*child, out, depth + 1, limit);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

/// Node visits allowed per text walk
pub const MAX_TEXT_WALK_NODES: usize = 10_000;

struct TextBudget {
    out: String,
    chars: usize,
    max_chars: usize,
    visited: usize,
    pending_space: bool,
}

impl TextBudget {
    fn is_spent(&self) -> bool {
        self.chars >= self.max_chars || self.visited >= MAX_TEXT_WALK_NODES
    }

    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.pending_space = !self.out.is_empty();
                continue;
            }
            if self.pending_space {
                self.pending_space = false;
                self.out.push(' ');
                self.chars += 1;
                if self.chars >= self.max_chars {
                    return;
                }
            }
            self.out.push(ch);
            self.chars += 1;
            if self.chars >= self.max_chars {
                return;
            }
        }
    }
}

fn write_open_tag(el: &ElementData, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&value.replace('&', "&amp;").replace('"', "&quot;"));
        out.push('"');
    }
    out.push('>');
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
