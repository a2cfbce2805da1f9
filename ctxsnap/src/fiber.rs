//! Mirror of the UI framework's internal component tree.
//!
//! Hosts copy what they can read from the live tree (work tag, component
//! type, return link, committed props, hook list) into a [`FiberTree`]. DOM
//! elements point into it through a runtime back-reference whose property
//! name starts with one of [`FIBER_KEY_PREFIXES`].

use crate::dom::{Document, NodeId};
use crate::ownership::{
    ComponentKind, ComponentOrigin, OwnerId, OwnershipNode, OwnershipSource, SourceLocation,
};
use crate::value::RuntimeValue;

/// Property-name prefixes of the back-reference from DOM node to fiber
pub const FIBER_KEY_PREFIXES: &[&str] = &["__reactFiber$", "__reactInternalInstance$"];

/// Numeric work tags as the framework assigns them
pub mod work_tag {
    pub const FUNCTION_COMPONENT: u8 = 0;
    pub const CLASS_COMPONENT: u8 = 1;
    pub const HOST_ROOT: u8 = 3;
    pub const HOST_COMPONENT: u8 = 5;
    pub const HOST_TEXT: u8 = 6;
    pub const FRAGMENT: u8 = 7;
    pub const CONTEXT_PROVIDER: u8 = 10;
    pub const FORWARD_REF: u8 = 11;
    pub const SUSPENSE: u8 = 13;
    pub const MEMO_COMPONENT: u8 = 14;
    pub const SIMPLE_MEMO_COMPONENT: u8 = 15;
}

/// The `type` of a fiber: what got rendered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentType {
    pub display_name: Option<String>,
    pub name: Option<String>,
    /// Inner type for forward-ref and memo wrappers
    pub wrapped: Option<Box<ComponentType>>,
}

impl ComponentType {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_string());
        self
    }

    pub fn wrapping(inner: ComponentType) -> Self {
        Self {
            wrapped: Some(Box::new(inner)),
            ..Default::default()
        }
    }

    /// Explicit display name wins over the function/class name; wrappers
    /// without either fall through to what they wrap
    pub fn resolve_name(&self) -> Option<(String, ComponentOrigin)> {
        let non_empty = |s: &Option<String>| s.as_deref().filter(|n| !n.is_empty()).map(String::from);
        if let Some(name) = non_empty(&self.display_name) {
            return Some((name, ComponentOrigin::DisplayName));
        }
        if let Some(name) = non_empty(&self.name) {
            return Some((name, ComponentOrigin::Fiber));
        }
        self.wrapped.as_ref().and_then(|inner| inner.resolve_name())
    }
}

/// One cell of the hook-state linked list
#[derive(Debug, Clone, PartialEq)]
pub struct HookCell {
    pub memoized_state: RuntimeValue,
    pub next: Option<Box<HookCell>>,
}

impl HookCell {
    /// Build a list from values in call order
    pub fn chain(values: Vec<RuntimeValue>) -> Option<HookCell> {
        values.into_iter().rev().fold(None, |next, memoized_state| {
            Some(HookCell {
                memoized_state,
                next: next.map(Box::new),
            })
        })
    }

    pub fn iter(&self) -> HookIter<'_> {
        HookIter { next: Some(self) }
    }
}

pub struct HookIter<'a> {
    next: Option<&'a HookCell>,
}

impl<'a> Iterator for HookIter<'a> {
    type Item = &'a RuntimeValue;

    fn next(&mut self) -> Option<Self::Item> {
        let cell = self.next?;
        self.next = cell.next.as_deref();
        Some(&cell.memoized_state)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fiber {
    pub tag: u8,
    pub element_type: Option<ComponentType>,
    pub return_fiber: Option<OwnerId>,
    pub memoized_props: RuntimeValue,
    pub hooks: Option<HookCell>,
    pub debug_source: Option<SourceLocation>,
}

impl Fiber {
    pub fn new(tag: u8, element_type: Option<ComponentType>) -> Self {
        Self {
            tag,
            element_type,
            return_fiber: None,
            memoized_props: RuntimeValue::Undefined,
            hooks: None,
            debug_source: None,
        }
    }

    pub fn function(name: &str) -> Self {
        Self::new(work_tag::FUNCTION_COMPONENT, Some(ComponentType::named(name)))
    }

    pub fn class(name: &str) -> Self {
        Self::new(work_tag::CLASS_COMPONENT, Some(ComponentType::named(name)))
    }

    pub fn host() -> Self {
        Self::new(work_tag::HOST_COMPONENT, None)
    }

    pub fn with_props(mut self, props: RuntimeValue) -> Self {
        self.memoized_props = props;
        self
    }

    pub fn with_hooks(mut self, values: Vec<RuntimeValue>) -> Self {
        self.hooks = HookCell::chain(values);
        self
    }

    pub fn with_source(mut self, file: &str, line: u32, column: Option<u32>) -> Self {
        self.debug_source = Some(SourceLocation {
            file: file.to_string(),
            line,
            column,
        });
        self
    }

    pub fn kind(&self) -> ComponentKind {
        match self.tag {
            work_tag::FUNCTION_COMPONENT => ComponentKind::Function,
            work_tag::CLASS_COMPONENT => ComponentKind::Class,
            work_tag::FORWARD_REF => ComponentKind::ForwardRef,
            work_tag::MEMO_COMPONENT => ComponentKind::Memo,
            work_tag::SIMPLE_MEMO_COMPONENT => ComponentKind::SimpleMemo,
            work_tag::HOST_COMPONENT | work_tag::HOST_TEXT => ComponentKind::Host,
            _ => ComponentKind::Other,
        }
    }
}

/// Arena of fibers; an [`OwnershipSource`] over the framework tree
#[derive(Debug, Clone, Default)]
pub struct FiberTree {
    fibers: Vec<Fiber>,
}

impl FiberTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fiber whose `return` link points at `parent`
    pub fn add(&mut self, mut fiber: Fiber, parent: Option<OwnerId>) -> OwnerId {
        fiber.return_fiber = parent.filter(|p| *p < self.fibers.len());
        self.fibers.push(fiber);
        self.fibers.len() - 1
    }

    /// Link a DOM element to its host fiber the way the framework does
    pub fn attach(&self, doc: &mut Document, element: NodeId, fiber: OwnerId) {
        doc.attach_runtime_ref(element, &format!("{}ctxsnap", FIBER_KEY_PREFIXES[0]), fiber);
    }

    pub fn get(&self, id: OwnerId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }
}

impl OwnershipSource for FiberTree {
    fn locate(&self, doc: &Document, element: NodeId) -> Option<OwnerId> {
        let el = doc.element(element)?;
        el.runtime_refs
            .iter()
            .find(|(key, _)| FIBER_KEY_PREFIXES.iter().any(|p| key.starts_with(p)))
            .map(|(_, handle)| *handle)
            .filter(|handle| *handle < self.fibers.len())
    }

    fn node(&self, id: OwnerId) -> Option<OwnershipNode<'_>> {
        let fiber = self.fibers.get(id)?;
        Some(OwnershipNode {
            name: fiber.element_type.as_ref().and_then(|t| t.resolve_name()),
            kind: fiber.kind(),
            parent: fiber.return_fiber,
            raw_props: &fiber.memoized_props,
            raw_state_cells: match &fiber.hooks {
                Some(first) => Box::new(first.iter()),
                None => Box::new(std::iter::empty()),
            },
            source: fiber.debug_source.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_chain_preserves_call_order() {
        let head = HookCell::chain(vec![
            RuntimeValue::from("a"),
            RuntimeValue::from("b"),
            RuntimeValue::from("c"),
        ])
        .unwrap();
        let values: Vec<_> = head.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
        assert!(HookCell::chain(vec![]).is_none());
    }

    #[test]
    fn test_name_resolution_order() {
        let plain = ComponentType::named("Button");
        assert_eq!(
            plain.resolve_name(),
            Some(("Button".to_string(), ComponentOrigin::Fiber))
        );

        let explicit = ComponentType::named("B").with_display_name("PrimaryButton");
        assert_eq!(
            explicit.resolve_name(),
            Some(("PrimaryButton".to_string(), ComponentOrigin::DisplayName))
        );

        let memo = ComponentType::wrapping(ComponentType::named("List"));
        assert_eq!(memo.resolve_name().map(|(n, _)| n), Some("List".to_string()));

        assert_eq!(ComponentType::default().resolve_name(), None);
    }

    #[test]
    fn test_locate_via_runtime_ref() {
        let (mut doc, body) = Document::with_html_body();
        let button = doc.append_element(body, "button", &[]);
        let mut tree = FiberTree::new();
        let app = tree.add(Fiber::function("App"), None);
        let host = tree.add(Fiber::host(), Some(app));
        tree.attach(&mut doc, button, host);

        assert_eq!(tree.locate(&doc, button), Some(host));
        assert_eq!(tree.locate(&doc, body), None);

        // legacy key prefix is recognized too
        doc.attach_runtime_ref(body, "__reactInternalInstance$abc", app);
        assert_eq!(tree.locate(&doc, body), Some(app));
    }

    #[test]
    fn test_dangling_parent_is_dropped() {
        let mut tree = FiberTree::new();
        let id = tree.add(Fiber::function("Orphan"), Some(42));
        assert_eq!(tree.get(id).unwrap().return_fiber, None);
    }
}
