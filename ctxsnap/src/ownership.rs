//! Ownership-path walking: which components produced a DOM element.
//!
//! The framework's internal tree is reached through [`OwnershipSource`], so
//! the traversal below never depends on a particular framework's object
//! layout. The noise patterns and state-shape heuristics are injectable
//! tables ([`NoiseFilter`], [`ShapeTable`]) rather than literals in the walk.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, trace};

use crate::dom::{Document, NodeId};
use crate::sanitize::{sanitize_props, sanitize_state_cells, SanitizeLimits};
use crate::shapes::ShapeTable;
use crate::value::RuntimeValue;

/// Handle of a node inside an [`OwnershipSource`]
pub type OwnerId = usize;

/// Attribute hosts can put on DOM nodes to name the owning component
pub const COMPONENT_MARKER_ATTRIBUTE: &str = "data-component";

/// Ancestor levels scanned for [`COMPONENT_MARKER_ATTRIBUTE`]
pub const MAX_MARKER_SCAN_DEPTH: usize = 10;

/// Raw entries kept when every resolved component is noise
pub const NOISE_FALLBACK_ENTRIES: usize = 3;

/// Default noise table. Matching names are framework plumbing with no
/// meaning to a reader of the report.
pub const DEFAULT_NOISE_PATTERNS: &[&str] = &[
    r"Provider$",
    r"Consumer$",
    r"^Context",
    r"Context$",
    r"^(?:Browser|Hash|Memory|Static)?Router$",
    r"^Routes?$",
    r"^(?:Switch|Outlet|Navigate|RenderedRoute)$",
    r"Boundary$",
    r"Root$",
    r"^Suspense",
    r"^Fragment$",
    r"^StrictMode$",
    r"^Profiler$",
];

// ============================================================================
// Types
// ============================================================================

/// Node kinds of the internal tree; only some are components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Function,
    Class,
    ForwardRef,
    Memo,
    SimpleMemo,
    Host,
    Other,
}

impl ComponentKind {
    pub fn is_component(&self) -> bool {
        matches!(
            self,
            ComponentKind::Function
                | ComponentKind::Class
                | ComponentKind::ForwardRef
                | ComponentKind::Memo
                | ComponentKind::SimpleMemo
        )
    }

    /// Only these keep local state in hook cells
    pub fn has_hook_state(&self) -> bool {
        matches!(
            self,
            ComponentKind::Function | ComponentKind::ForwardRef | ComponentKind::SimpleMemo
        )
    }
}

/// How a path entry's name was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentOrigin {
    /// Function/class name read from the internal tree
    Fiber,
    /// Marker attribute on the DOM
    Attribute,
    /// Explicit display name set by the author
    DisplayName,
}

/// Where a component was defined, when the framework recorded it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// One entry of the ownership path, root-first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPathItem {
    pub name: String,
    pub origin: ComponentOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Vec<Value>>,
}

impl ComponentPathItem {
    pub fn named(name: impl Into<String>, origin: ComponentOrigin) -> Self {
        Self {
            name: name.into(),
            origin,
            source: None,
            props: None,
            state: None,
        }
    }
}

/// Lazily walked hook-state cells
pub type StateCells<'a> = Box<dyn Iterator<Item = &'a RuntimeValue> + 'a>;

/// Framework-neutral view of one internal tree node
pub struct OwnershipNode<'a> {
    /// Resolved component name and how it was resolved
    pub name: Option<(String, ComponentOrigin)>,
    pub kind: ComponentKind,
    pub parent: Option<OwnerId>,
    pub raw_props: &'a RuntimeValue,
    pub raw_state_cells: StateCells<'a>,
    pub source: Option<SourceLocation>,
}

/// Adapter from a framework's internal representation to [`OwnershipNode`]
pub trait OwnershipSource {
    /// Find the internal node attached to a DOM element
    fn locate(&self, doc: &Document, element: NodeId) -> Option<OwnerId>;

    fn node(&self, id: OwnerId) -> Option<OwnershipNode<'_>>;
}

// ============================================================================
// Noise filter
// ============================================================================

/// Versioned table of component-name patterns treated as framework noise
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    version: u32,
    patterns: Vec<Regex>,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(1, DEFAULT_NOISE_PATTERNS).expect("default noise patterns are valid")
    }
}

impl NoiseFilter {
    pub fn new(version: u32, patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { version, patterns })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_noise(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }
}

// ============================================================================
// Walker
// ============================================================================

/// Bounds on the walk itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Internal-tree ancestors visited at most
    pub max_ancestors: usize,
    /// Entries returned at most (the ones closest to the element win)
    pub max_path_length: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            max_ancestors: 100,
            max_path_length: 20,
        }
    }
}

/// Recovers the component path for a DOM element
#[derive(Debug, Clone, Default)]
pub struct OwnershipWalker {
    pub noise: NoiseFilter,
    pub shapes: ShapeTable,
    pub sanitize: SanitizeLimits,
    pub limits: WalkLimits,
}

struct RawEntry {
    item: ComponentPathItem,
    noise: bool,
}

impl OwnershipWalker {
    pub fn new(noise: NoiseFilter, shapes: ShapeTable) -> Self {
        Self {
            noise,
            shapes,
            ..Default::default()
        }
    }

    /// Ordered root-to-leaf component path for `element`.
    ///
    /// Returns an empty list when neither the internal tree nor marker
    /// attributes name any component. When every resolved name is noise the
    /// last [`NOISE_FALLBACK_ENTRIES`] unfiltered entries are returned
    /// instead; that is a degeneracy guard, not a disambiguation.
    pub fn extract_ownership_path(
        &self,
        source: Option<&dyn OwnershipSource>,
        doc: &Document,
        element: NodeId,
    ) -> Vec<ComponentPathItem> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut raw: Vec<RawEntry> = Vec::new();

        if let Some(source) = source {
            match source.locate(doc, element) {
                Some(start) => self.walk_owners(source, start, &mut seen, &mut raw),
                None => debug!(target: "ctxsnap::ownership", node = element.0, "no internal node attached to element"),
            }
        }

        for name in self.marker_names(doc, element) {
            if seen.insert(name.clone()) {
                let noise = self.noise.is_noise(&name);
                raw.push(RawEntry {
                    item: ComponentPathItem::named(name, ComponentOrigin::Attribute),
                    noise,
                });
            }
        }

        let total = raw.len();
        let mut path: Vec<ComponentPathItem> = raw
            .iter()
            .filter(|entry| !entry.noise)
            .map(|entry| entry.item.clone())
            .collect();

        if path.is_empty() && total > 0 {
            debug!(
                target: "ctxsnap::ownership",
                total, "every component matched the noise filter; keeping last raw entries"
            );
            path = raw
                .into_iter()
                .skip(total.saturating_sub(NOISE_FALLBACK_ENTRIES))
                .map(|entry| entry.item)
                .collect();
        }

        if path.len() > self.limits.max_path_length {
            path.drain(..path.len() - self.limits.max_path_length);
        }
        path
    }

    fn walk_owners(
        &self,
        source: &dyn OwnershipSource,
        start: OwnerId,
        seen: &mut HashSet<String>,
        raw: &mut Vec<RawEntry>,
    ) {
        let mut current = Some(start);
        let mut steps = 0;

        while let Some(id) = current {
            if steps >= self.limits.max_ancestors {
                debug!(target: "ctxsnap::ownership", steps, "ancestor ceiling reached");
                break;
            }
            steps += 1;

            let Some(node) = source.node(id) else {
                break;
            };
            current = node.parent;

            if !node.kind.is_component() {
                continue;
            }
            let Some((name, origin)) = node.name else {
                continue;
            };
            if !seen.insert(name.clone()) {
                continue;
            }

            let noise = self.noise.is_noise(&name);
            trace!(target: "ctxsnap::ownership", %name, kind = ?node.kind, noise, "component");

            let mut item = ComponentPathItem::named(name, origin);
            item.source = node.source;
            if !noise {
                item.props = sanitize_props(node.raw_props, &self.sanitize);
                if node.kind.has_hook_state() {
                    item.state =
                        sanitize_state_cells(node.raw_state_cells, &self.shapes, &self.sanitize);
                }
            }
            // walking leaf-to-root, so the head is the root side
            raw.insert(0, RawEntry { item, noise });
        }
    }

    /// Marker-attribute names from the element up, returned root-first
    fn marker_names(&self, doc: &Document, element: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = doc.element(element).map(|_| element);
        let mut depth = 0;
        while let Some(node) = current {
            if depth > MAX_MARKER_SCAN_DEPTH {
                break;
            }
            if let Some(name) = doc
                .element(node)
                .and_then(|el| el.attr(COMPONENT_MARKER_ATTRIBUTE))
                .map(str::trim)
                .filter(|n| !n.is_empty())
            {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
            depth += 1;
            current = doc.parent_element(node);
        }
        names.reverse();
        names
    }
}

/// Shorthand using the default tables
pub fn extract_ownership_path(
    source: Option<&dyn OwnershipSource>,
    doc: &Document,
    element: NodeId,
) -> Vec<ComponentPathItem> {
    OwnershipWalker::default().extract_ownership_path(source, doc, element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_noise_table() {
        let filter = NoiseFilter::default();
        assert_eq!(filter.version(), 1);
        for name in [
            "ThemeProvider",
            "BrowserRouter",
            "Routes",
            "ErrorBoundary",
            "AppRoot",
            "Suspense",
            "StrictMode",
            "Fragment",
            "Profiler",
            "QueryClientProvider",
            "ContextConsumer",
        ] {
            assert!(filter.is_noise(name), "{name} should be noise");
        }
        for name in ["App", "SaveButton", "UserProfile", "Toolbar"] {
            assert!(!filter.is_noise(name), "{name} should not be noise");
        }
    }

    #[test]
    fn test_custom_noise_table() {
        let filter = NoiseFilter::new(7, &[r"^Internal"]).unwrap();
        assert_eq!(filter.version(), 7);
        assert!(filter.is_noise("InternalWrapper"));
        assert!(!filter.is_noise("ThemeProvider"));
        assert!(NoiseFilter::new(1, &["("]).is_err());
    }

    #[test]
    fn test_component_kinds() {
        assert!(ComponentKind::Memo.is_component());
        assert!(!ComponentKind::Host.is_component());
        assert!(!ComponentKind::Class.has_hook_state());
        assert!(ComponentKind::Function.has_hook_state());
    }

    #[test]
    fn test_marker_attributes_without_framework_tree() {
        let (mut doc, body) = Document::with_html_body();
        let page = doc.append_element(body, "main", &[("data-component", "SettingsPage")]);
        let form = doc.append_element(page, "form", &[("data-component", "ProfileForm")]);
        let input = doc.append_element(form, "input", &[]);

        let path = extract_ownership_path(None, &doc, input);
        let names: Vec<_> = path.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["SettingsPage", "ProfileForm"]);
        assert!(path.iter().all(|p| p.origin == ComponentOrigin::Attribute));
    }

    #[test]
    fn test_no_metadata_yields_empty_path() {
        let (mut doc, body) = Document::with_html_body();
        let div = doc.append_element(body, "div", &[]);
        assert!(extract_ownership_path(None, &doc, div).is_empty());
        assert!(extract_ownership_path(None, &doc, NodeId(999)).is_empty());
    }
}
