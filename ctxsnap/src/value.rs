//! Dynamically-typed runtime values read from the live page.
//!
//! Component properties, hook state and external store snapshots all arrive
//! as loosely-typed script values. [`RuntimeValue`] models them closely enough
//! to reproduce the serialization rules the report format depends on.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Marker appended to truncated strings
pub const ELLIPSIS: &str = "...";

/// A script value as observed on the page
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RuntimeValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<RuntimeValue>),
    Object(BTreeMap<String, RuntimeValue>),
    /// A callable; only its name survives capture
    Function { name: String },
    /// Anything that cannot be represented as JSON (symbols, big integers,
    /// cyclic back-references, host objects)
    Opaque(String),
}

/// Returned by [`RuntimeValue::to_json`] when a value cannot be serialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotSerializable(pub String);

impl fmt::Display for NotSerializable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value is not serializable: {}", self.0)
    }
}

impl std::error::Error for NotSerializable {}

impl RuntimeValue {
    pub fn string(s: impl Into<String>) -> Self {
        RuntimeValue::String(s.into())
    }

    pub fn function(name: impl Into<String>) -> Self {
        RuntimeValue::Function { name: name.into() }
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RuntimeValue)>,
    {
        RuntimeValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, RuntimeValue::Undefined | RuntimeValue::Null)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, RuntimeValue::Function { .. })
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, RuntimeValue>> {
        match self {
            RuntimeValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RuntimeValue]> {
        match self {
            RuntimeValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RuntimeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RuntimeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Property lookup; `Undefined` for non-objects and missing keys
    pub fn get(&self, key: &str) -> &RuntimeValue {
        static UNDEFINED: RuntimeValue = RuntimeValue::Undefined;
        self.as_object()
            .and_then(|map| map.get(key))
            .unwrap_or(&UNDEFINED)
    }

    /// Script truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            RuntimeValue::Undefined | RuntimeValue::Null => false,
            RuntimeValue::Bool(b) => *b,
            RuntimeValue::Number(n) => *n != 0.0 && !n.is_nan(),
            RuntimeValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Convert following script JSON rules.
    ///
    /// Functions and `undefined` are dropped from objects and become `null`
    /// inside arrays; a top-level function or `undefined` yields `Ok(None)`.
    /// Any opaque value anywhere makes the whole conversion fail.
    pub fn to_json(&self) -> Result<Option<Value>, NotSerializable> {
        match self {
            RuntimeValue::Undefined | RuntimeValue::Function { .. } => Ok(None),
            RuntimeValue::Null => Ok(Some(Value::Null)),
            RuntimeValue::Bool(b) => Ok(Some(Value::Bool(*b))),
            RuntimeValue::Number(n) => Ok(Some(number_to_json(*n).unwrap_or(Value::Null))),
            RuntimeValue::String(s) => Ok(Some(Value::String(s.clone()))),
            RuntimeValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_json()?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(out)))
            }
            RuntimeValue::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    if let Some(v) = value.to_json()? {
                        out.insert(key.clone(), v);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            RuntimeValue::Opaque(what) => Err(NotSerializable(what.clone())),
        }
    }

    /// Length of the compact JSON form, if serializable
    pub fn serialized_len(&self) -> Option<usize> {
        match self.to_json() {
            Ok(Some(v)) => serde_json::to_string(&v).ok().map(|s| s.len()),
            Ok(None) => Some(0),
            Err(_) => None,
        }
    }
}

impl From<Value> for RuntimeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RuntimeValue::Null,
            Value::Bool(b) => RuntimeValue::Bool(b),
            Value::Number(n) => RuntimeValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => RuntimeValue::String(s),
            Value::Array(items) => {
                RuntimeValue::Array(items.into_iter().map(RuntimeValue::from).collect())
            }
            Value::Object(map) => RuntimeValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, RuntimeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for RuntimeValue {
    fn from(s: &str) -> Self {
        RuntimeValue::String(s.to_string())
    }
}

impl From<bool> for RuntimeValue {
    fn from(b: bool) -> Self {
        RuntimeValue::Bool(b)
    }
}

impl From<f64> for RuntimeValue {
    fn from(n: f64) -> Self {
        RuntimeValue::Number(n)
    }
}

/// Largest integer a script number holds exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Script number to JSON: integral values stay integers, `None` for NaN and
/// infinities.
pub fn number_to_json(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}

/// Truncate to `max` characters, appending [`ELLIPSIS`] when cut.
///
/// The marker is counted inside the budget so the result never exceeds
/// `max` characters.
pub fn truncate_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut out: String = input.chars().take(keep).collect();
    out.push_str(&ELLIPSIS[..ELLIPSIS.len().min(max)]);
    out
}
