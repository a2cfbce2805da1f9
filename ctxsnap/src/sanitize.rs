//! Turning raw component properties and hook state into bounded JSON.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::shapes::{
    is_element_like, is_event_handler_name, is_promise_like, is_query_state_like, ShapeTable,
};
use crate::value::{number_to_json, truncate_chars, RuntimeValue};

/// Property names never worth reporting
const SKIPPED_PROP_NAMES: &[&str] = &["children", "ref", "key"];

static SENSITIVE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:passw(?:or)?d|^pwd$|secret|token|credential|api[-_]?key|private[-_]?key|^auth(?:orization)?$|cookie|session[-_]?id)",
    )
    .expect("sensitive name pattern is valid")
});

/// Bounds applied while sanitizing one component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeLimits {
    pub max_string_length: usize,
    pub max_array_preview: usize,
    pub max_depth: usize,
    pub max_props: usize,
    pub max_state_cells: usize,
    pub max_state_object_bytes: usize,
}

impl Default for SanitizeLimits {
    fn default() -> Self {
        Self {
            max_string_length: 100,
            max_array_preview: 10,
            max_depth: 3,
            max_props: 20,
            max_state_cells: 25,
            max_state_object_bytes: 500,
        }
    }
}

pub fn is_sensitive_name(name: &str) -> bool {
    SENSITIVE_NAME.is_match(name)
}

/// Sanitized view of a component's last committed properties.
///
/// Returns `None` when nothing survives.
pub fn sanitize_props(props: &RuntimeValue, limits: &SanitizeLimits) -> Option<Map<String, Value>> {
    let entries = props.as_object()?;
    let mut out = Map::new();

    for (key, value) in entries {
        if out.len() >= limits.max_props {
            break;
        }
        if SKIPPED_PROP_NAMES.contains(&key.as_str()) || is_sensitive_name(key) {
            continue;
        }
        if is_promise_like(value) || is_element_like(value) {
            continue;
        }
        if let RuntimeValue::Function { name } = value {
            if is_event_handler_name(key) {
                continue;
            }
            out.insert(key.clone(), Value::String(function_marker(name)));
            continue;
        }
        // whatever cannot round-trip through JSON is dropped outright
        if value.to_json().is_err() {
            continue;
        }
        if let Some(clean) = sanitize_value(value, 0, limits) {
            out.insert(key.clone(), clean);
        }
    }

    (!out.is_empty()).then_some(out)
}

/// Sanitized, meaningful hook-state values of a function component.
///
/// At most `limits.max_state_cells` cells are read from `cells`.
pub fn sanitize_state_cells<'a, I>(
    cells: I,
    shapes: &ShapeTable,
    limits: &SanitizeLimits,
) -> Option<Vec<Value>>
where
    I: IntoIterator<Item = &'a RuntimeValue>,
{
    let mut out = Vec::new();

    for cell in cells.into_iter().take(limits.max_state_cells) {
        if shapes.skipped_shape(cell).is_some() {
            continue;
        }
        if is_query_state_like(cell) {
            if let Some(summary) = summarize_query_state(cell, limits) {
                out.push(summary);
            }
            continue;
        }
        if let Some(kept) = sanitize_state_value(cell, limits) {
            out.push(kept);
        }
    }

    // booleans and nulls alone say nothing about what the component shows
    out.retain(|v| !matches!(v, Value::Bool(_) | Value::Null));
    (!out.is_empty()).then_some(out)
}

fn sanitize_state_value(cell: &RuntimeValue, limits: &SanitizeLimits) -> Option<Value> {
    match cell {
        RuntimeValue::Undefined | RuntimeValue::Function { .. } | RuntimeValue::Opaque(_) => None,
        RuntimeValue::Null => Some(Value::Null),
        RuntimeValue::Bool(b) => Some(Value::Bool(*b)),
        RuntimeValue::Number(_) | RuntimeValue::String(_) => sanitize_value(cell, 0, limits),
        RuntimeValue::Array(items) => match cell.serialized_len() {
            Some(len)
                if len <= limits.max_state_object_bytes
                    && items.len() <= limits.max_array_preview =>
            {
                sanitize_value(cell, 0, limits)
            }
            Some(_) => Some(Value::String(format!("[Array({})]", items.len()))),
            None => None,
        },
        RuntimeValue::Object(map) => match cell.serialized_len() {
            Some(len) if len <= limits.max_state_object_bytes => sanitize_value(cell, 0, limits),
            Some(_) => Some(Value::String(format!("[Object: {} keys]", map.len()))),
            None => None,
        },
    }
}

/// Minimal summary of a query/mutation result; `None` for idle results
/// without data
pub fn summarize_query_state(value: &RuntimeValue, limits: &SanitizeLimits) -> Option<Value> {
    let status = value.get("status").as_str().unwrap_or("unknown");
    let data = value.get("data");
    let idle = status == "idle" || value.get("isIdle").as_bool() == Some(true);
    if idle && data.is_nullish() {
        return None;
    }

    let mut summary = Map::new();
    summary.insert("status".into(), Value::String(status.to_string()));
    if !data.is_nullish() {
        if let Some(clean) = sanitize_value(data, 1, limits) {
            summary.insert("data".into(), clean);
        }
    }
    let error = value.get("error");
    if error.is_truthy() {
        let message = error
            .get("message")
            .as_str()
            .or_else(|| error.as_str())
            .unwrap_or("[Error]");
        summary.insert(
            "error".into(),
            Value::String(truncate_chars(message, limits.max_string_length)),
        );
    }
    for flag in ["isLoading", "isFetching", "isPending", "isError"] {
        if value.get(flag).as_bool() == Some(true) {
            summary.insert(flag.into(), Value::Bool(true));
        }
    }
    Some(Value::Object(summary))
}

/// Bounded JSON form of an arbitrary value.
///
/// Strings are truncated, arrays previewed, objects cut off below
/// `limits.max_depth`; empty containers and unrepresentable values vanish.
pub fn sanitize_value(value: &RuntimeValue, depth: usize, limits: &SanitizeLimits) -> Option<Value> {
    match value {
        RuntimeValue::Undefined | RuntimeValue::Opaque(_) => None,
        RuntimeValue::Null => Some(Value::Null),
        RuntimeValue::Bool(b) => Some(Value::Bool(*b)),
        RuntimeValue::Number(n) => Some(number_to_json(*n).unwrap_or(Value::Null)),
        RuntimeValue::String(s) => Some(Value::String(truncate_chars(s, limits.max_string_length))),
        RuntimeValue::Function { name } => Some(Value::String(function_marker(name))),
        RuntimeValue::Array(items) => {
            if items.is_empty() {
                return None;
            }
            if depth >= limits.max_depth {
                return Some(Value::String(format!("[Array({})]", items.len())));
            }
            let mut out: Vec<Value> = items
                .iter()
                .take(limits.max_array_preview)
                .filter_map(|item| sanitize_value(item, depth + 1, limits))
                .collect();
            if items.len() > limits.max_array_preview {
                out.push(Value::String(format!(
                    "... {} more",
                    items.len() - limits.max_array_preview
                )));
            }
            (!out.is_empty()).then_some(Value::Array(out))
        }
        RuntimeValue::Object(map) => {
            if is_element_like(value) || is_promise_like(value) {
                return None;
            }
            if map.is_empty() {
                return None;
            }
            if depth >= limits.max_depth {
                return Some(Value::String(format!("[Object: {} keys]", map.len())));
            }
            let mut out = Map::new();
            for (key, item) in map {
                if is_sensitive_name(key) {
                    continue;
                }
                if let Some(clean) = sanitize_value(item, depth + 1, limits) {
                    out.insert(key.clone(), clean);
                }
            }
            (!out.is_empty()).then_some(Value::Object(out))
        }
    }
}

fn function_marker(name: &str) -> String {
    if name.is_empty() {
        "[Function]".to_string()
    } else {
        format!("[Function: {name}]")
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
    fn test_props_skip_noise_and_secrets() {
        let props = RuntimeValue::object([
            ("children", v(json!("text"))),
            ("key", v(json!("k1"))),
            ("password", v(json!("hunter2"))),
            ("apiKey", v(json!("abc"))),
            ("label", v(json!("Save"))),
            ("onClick", RuntimeValue::function("handleClick")),
            ("format", RuntimeValue::function("formatDate")),
            ("icon", v(json!({"$$typeof": "react.element", "type": "svg"}))),
            (
                "loader",
                RuntimeValue::object([("then", RuntimeValue::function("then"))]),
            ),
            ("empty", v(json!({}))),
            ("nothing", v(json!([]))),
            ("cyclic", RuntimeValue::Opaque("[Circular]".into())),
        ]);

        let out = sanitize_props(&props, &SanitizeLimits::default()).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"label": "Save", "format": "[Function: formatDate]"})
        );
    }

    #[test]
    fn test_props_truncate_strings_and_arrays() {
        let long = "x".repeat(250);
        let items: Vec<serde_json::Value> = (0..15).map(|i| json!(i)).collect();
        let props = v(json!({"title": long, "items": items}));

        let out = sanitize_props(&props, &SanitizeLimits::default()).unwrap();
        let title = out["title"].as_str().unwrap();
        assert_eq!(title.chars().count(), 100);
        assert!(title.ends_with("..."));
        let preview = out["items"].as_array().unwrap();
        assert_eq!(preview.len(), 11);
        assert_eq!(preview[10], json!("... 5 more"));
    }

    #[test]
    fn test_props_keep_integers() {
        let props = v(json!({"quantity": 2, "price": 9.99}));
        let out = sanitize_props(&props, &SanitizeLimits::default()).unwrap();
        assert_eq!(Value::Object(out).to_string(), r#"{"price":9.99,"quantity":2}"#);
    }

    #[test]
    fn test_props_respect_max_count() {
        let props = RuntimeValue::object((0..40).map(|i| (format!("p{i:02}"), v(json!(i)))));
        let out = sanitize_props(&props, &SanitizeLimits::default()).unwrap();
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn test_deep_objects_are_cut() {
        let props = v(json!({"config": {"a": {"b": {"c": {"d": 1}}}}}));
        let out = sanitize_props(&props, &SanitizeLimits::default()).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"config": {"a": {"b": {"c": "[Object: 1 keys]"}}}})
        );
    }

    #[test]
    fn test_idle_mutation_state_is_dropped() {
        let idle = v(json!({"isIdle": true, "status": "idle", "submittedAt": 0}));
        let cells = [idle];
        assert_eq!(
            sanitize_state_cells(cells.iter(), &ShapeTable::default(), &SanitizeLimits::default()),
            None
        );
    }

    #[test]
    fn test_query_state_is_compacted() {
        let query = RuntimeValue::object([
            ("status", v(json!("error"))),
            ("data", RuntimeValue::Undefined),
            ("error", v(json!({"message": "Network down", "stack": "..."}))),
            ("isError", v(json!(true))),
            ("isFetching", v(json!(false))),
            ("refetch", RuntimeValue::function("refetch")),
        ]);
        let out = sanitize_state_cells(
            [query].iter(),
            &ShapeTable::default(),
            &SanitizeLimits::default(),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![json!({"status": "error", "error": "Network down", "isError": true})]
        );
    }

    #[test]
    fn test_state_cells_filter_shapes_and_flags() {
        let cells = vec![
            v(json!("draft title")),
            v(json!(true)),
            v(json!(null)),
            v(json!({"current": null})),
            v(json!([null, [1]])),
            RuntimeValue::object([
                ("create", RuntimeValue::function("")),
                ("deps", v(json!([]))),
            ]),
            v(json!(42)),
            v(json!({"page": 2, "size": 10})),
            RuntimeValue::object((0..100).map(|i| (format!("key{i}"), v(json!("value"))))),
        ];

        let out = sanitize_state_cells(
            cells.iter(),
            &ShapeTable::default(),
            &SanitizeLimits::default(),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                json!("draft title"),
                json!(42),
                json!({"page": 2, "size": 10}),
                json!("[Object: 100 keys]"),
            ]
        );
    }

    #[test]
    fn test_state_cell_walk_is_bounded() {
        let cells: Vec<RuntimeValue> = (0..100).map(|i| v(json!(format!("s{i}")))).collect();
        let out = sanitize_state_cells(
            cells.iter(),
            &ShapeTable::default(),
            &SanitizeLimits::default(),
        )
        .unwrap();
        assert_eq!(out.len(), 25);
    }

    #[test]
    fn test_sensitive_names() {
        assert!(is_sensitive_name("password"));
        assert!(is_sensitive_name("userPassword"));
        assert!(is_sensitive_name("accessToken"));
        assert!(is_sensitive_name("client_secret"));
        assert!(is_sensitive_name("api_key"));
        assert!(!is_sensitive_name("passive"));
        assert!(!is_sensitive_name("author"));
        assert!(!is_sensitive_name("label"));
    }
}
