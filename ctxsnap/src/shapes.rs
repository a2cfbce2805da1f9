//! Structural predicates for classifying runtime values.
//!
//! Nothing on the page carries a nominal type, so pending computations, ref
//! objects, framework elements and effect records are recognized by shape.
//! Each test is a plain function so it can be exercised in isolation, and the
//! set applied to hook state lives in a [`ShapeTable`] that callers can swap.

use crate::value::RuntimeValue;

pub type ShapePredicate = fn(&RuntimeValue) -> bool;

/// Marker field carried by framework element objects
pub const ELEMENT_MARKER_FIELD: &str = "$$typeof";

/// Boolean flags of the async query library's result objects
pub const QUERY_STATE_FLAGS: &[&str] = &[
    "isIdle",
    "isLoading",
    "isPending",
    "isFetching",
    "isSuccess",
    "isError",
    "isRefetching",
];

/// Non-flag fields that also identify a query/mutation result
const QUERY_STATE_FIELDS: &[&str] = &["fetchStatus", "dataUpdatedAt", "submittedAt", "failureCount"];

/// Object with a callable `then`
pub fn is_promise_like(value: &RuntimeValue) -> bool {
    value.as_object().is_some() && value.get("then").is_function()
}

/// Framework element, e.g. something a component received as a render prop
pub fn is_element_like(value: &RuntimeValue) -> bool {
    value
        .as_object()
        .map(|map| map.contains_key(ELEMENT_MARKER_FIELD))
        .unwrap_or(false)
}

/// `{ current }` and nothing else
pub fn is_ref_like(value: &RuntimeValue) -> bool {
    value
        .as_object()
        .map(|map| map.len() == 1 && map.contains_key("current"))
        .unwrap_or(false)
}

/// Effect record stored in a hook cell: a `create` callback plus deps or a
/// destroy slot
pub fn is_effect_like(value: &RuntimeValue) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    map.get("create").map(|c| c.is_function()).unwrap_or(false)
        && (map.contains_key("deps") || map.contains_key("destroy") || map.contains_key("inst"))
}

/// Two-slot array whose first slot is null (memo cells before first compute)
pub fn is_null_first_tuple(value: &RuntimeValue) -> bool {
    matches!(value.as_array(), Some([RuntimeValue::Null, _]))
}

/// Result object of the async query library: a string `status` plus at least
/// one of its well-known flags or bookkeeping fields
pub fn is_query_state_like(value: &RuntimeValue) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    if map.get("status").and_then(|s| s.as_str()).is_none() {
        return false;
    }
    QUERY_STATE_FLAGS
        .iter()
        .chain(QUERY_STATE_FIELDS.iter())
        .any(|k| map.contains_key(*k))
}

/// `onClick`, `onSubmit`, ...
pub fn is_event_handler_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('o')
        && chars.next() == Some('n')
        && chars.next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
}

/// Versioned set of hook-state shapes that carry no meaning for a reader
#[derive(Debug, Clone)]
pub struct ShapeTable {
    version: u32,
    skipped_state_shapes: Vec<(&'static str, ShapePredicate)>,
}

impl Default for ShapeTable {
    fn default() -> Self {
        Self {
            version: 1,
            skipped_state_shapes: vec![
                ("effect", is_effect_like),
                ("ref", is_ref_like),
                ("null_first_tuple", is_null_first_tuple),
                ("promise", is_promise_like),
                ("element", is_element_like),
            ],
        }
    }
}

impl ShapeTable {
    pub fn new(version: u32, skipped_state_shapes: Vec<(&'static str, ShapePredicate)>) -> Self {
        Self {
            version,
            skipped_state_shapes,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Name of the first skipped shape `value` matches
    pub fn skipped_shape(&self, value: &RuntimeValue) -> Option<&'static str> {
        self.skipped_state_shapes
            .iter()
            .find(|(_, predicate)| predicate(value))
            .map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(value: serde_json::Value) -> RuntimeValue {
        RuntimeValue::from(value)
    }

    #[test]
    fn test_promise_like_needs_callable_then() {
        let promise = RuntimeValue::object([("then", RuntimeValue::function("then"))]);
        assert!(is_promise_like(&promise));
        assert!(!is_promise_like(&v(json!({"then": "soon"}))));
        assert!(!is_promise_like(&RuntimeValue::function("then")));
    }

    #[test]
    fn test_ref_like_is_exactly_one_key() {
        assert!(is_ref_like(&v(json!({"current": null}))));
        assert!(!is_ref_like(&v(json!({"current": 1, "other": 2}))));
    }

    #[test]
    fn test_effect_like() {
        let effect = RuntimeValue::object([
            ("create", RuntimeValue::function("")),
            ("deps", v(json!([1]))),
        ]);
        assert!(is_effect_like(&effect));
        assert!(!is_effect_like(&v(json!({"create": 1, "deps": []}))));
    }

    #[test]
    fn test_null_first_tuple() {
        assert!(is_null_first_tuple(&v(json!([null, [1, 2]]))));
        assert!(!is_null_first_tuple(&v(json!([1, null]))));
        assert!(!is_null_first_tuple(&v(json!([null, 1, 2]))));
    }

    #[test]
    fn test_query_state_like() {
        assert!(is_query_state_like(&v(
            json!({"status": "idle", "isIdle": true, "submittedAt": 0})
        )));
        assert!(is_query_state_like(&v(
            json!({"status": "success", "data": [1], "fetchStatus": "idle"})
        )));
        assert!(!is_query_state_like(&v(json!({"status": "open"}))));
        assert!(!is_query_state_like(&v(json!({"status": 3, "isIdle": true}))));
    }

    #[test]
    fn test_event_handler_names() {
        assert!(is_event_handler_name("onClick"));
        assert!(!is_event_handler_name("once"));
        assert!(!is_event_handler_name("on"));
        assert!(!is_event_handler_name("render"));
    }

    #[test]
    fn test_table_reports_matching_shape() {
        let table = ShapeTable::default();
        assert_eq!(table.skipped_shape(&v(json!({"current": 1}))), Some("ref"));
        assert_eq!(table.skipped_shape(&v(json!({"count": 1}))), None);

        let empty = ShapeTable::new(2, vec![]);
        assert_eq!(empty.version(), 2);
        assert_eq!(empty.skipped_shape(&v(json!({"current": 1}))), None);
    }
}
