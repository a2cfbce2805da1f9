//! External application state: a fixed registry of store adapters plus the
//! redaction and cleaning applied to whatever they return.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::errors::ContextError;
use crate::page::Page;
use crate::value::{number_to_json, RuntimeValue};

/// Replaces the value of every redacted key
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Key under which the caller-supplied state is merged
pub const CUSTOM_STATE_KEY: &str = "custom";

/// Keys that are store plumbing rather than application state
pub const NOISE_KEYS: &[&str] = &["_persist", "_hasHydrated", "_hydrated", "$$typeof", "router"];

/// Keys with this prefix are internal to a library
pub const INTERNAL_KEY_PREFIX: &str = "__";

/// Caller-supplied getter for state no adapter knows about
pub type CustomStateGetter = dyn Fn() -> anyhow::Result<RuntimeValue> + Send + Sync;

/// Merged state keyed by adapter name (plus [`CUSTOM_STATE_KEY`])
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapturedAppState(pub BTreeMap<String, Value>);

impl CapturedAppState {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

// ============================================================================
// Adapters
// ============================================================================

/// One kind of external state container
pub trait StateAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self, page: &Page) -> bool;

    /// `None` when the store is missing or in a bad state
    fn get_state(&self, page: &Page) -> Option<RuntimeValue>;
}

/// Read a container snapshot, turning errors and panics into `None`
fn read_container(page: &Page, global: &str, adapter: &str) -> Option<RuntimeValue> {
    let container = page.container(global)?;
    match catch_unwind(AssertUnwindSafe(|| container.snapshot())) {
        Ok(Ok(state)) => Some(state),
        Ok(Err(e)) => {
            debug!(target: "ctxsnap::state", adapter, error = %e, "store snapshot failed");
            None
        }
        Err(_) => {
            warn!(target: "ctxsnap::state", adapter, "store snapshot panicked");
            None
        }
    }
}

fn retain_entries(
    value: RuntimeValue,
    keep: impl Fn(&str, &RuntimeValue) -> bool,
) -> RuntimeValue {
    match value {
        RuntimeValue::Object(map) => {
            RuntimeValue::Object(map.into_iter().filter(|(k, v)| keep(k, v)).collect())
        }
        other => other,
    }
}

/// Single global store exposing `getState()`
#[derive(Debug, Clone, Default)]
pub struct ReduxAdapter;

impl ReduxAdapter {
    pub const GLOBAL: &'static str = "__REDUX_STORE__";
}

impl StateAdapter for ReduxAdapter {
    fn name(&self) -> &str {
        "redux"
    }

    fn is_available(&self, page: &Page) -> bool {
        page.container(Self::GLOBAL).is_some()
    }

    fn get_state(&self, page: &Page) -> Option<RuntimeValue> {
        read_container(page, Self::GLOBAL, self.name())
    }
}

/// Map of named hook stores; actions are functions and get stripped
#[derive(Debug, Clone, Default)]
pub struct ZustandAdapter;

impl ZustandAdapter {
    pub const GLOBAL: &'static str = "__ZUSTAND_STORES__";
}

impl StateAdapter for ZustandAdapter {
    fn name(&self) -> &str {
        "zustand"
    }

    fn is_available(&self, page: &Page) -> bool {
        page.container(Self::GLOBAL).is_some()
    }

    fn get_state(&self, page: &Page) -> Option<RuntimeValue> {
        let stores = read_container(page, Self::GLOBAL, self.name())?;
        let RuntimeValue::Object(map) = stores else {
            return None;
        };
        Some(RuntimeValue::Object(
            map.into_iter()
                .map(|(store, state)| (store, retain_entries(state, |_, v| !v.is_function())))
                .collect(),
        ))
    }
}

/// Atom store; unlabeled atoms (`atom12`) carry no readable name
#[derive(Debug, Clone, Default)]
pub struct JotaiAdapter;

impl JotaiAdapter {
    pub const GLOBAL: &'static str = "__JOTAI_STORE__";
}

fn is_unlabeled_atom(key: &str) -> bool {
    key.strip_prefix("atom")
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

impl StateAdapter for JotaiAdapter {
    fn name(&self) -> &str {
        "jotai"
    }

    fn is_available(&self, page: &Page) -> bool {
        page.container(Self::GLOBAL).is_some()
    }

    fn get_state(&self, page: &Page) -> Option<RuntimeValue> {
        let atoms = read_container(page, Self::GLOBAL, self.name())?;
        Some(retain_entries(atoms, |k, _| !is_unlabeled_atom(k)))
    }
}

/// Observable stores; `$`-prefixed administration keys are dropped
#[derive(Debug, Clone, Default)]
pub struct MobxAdapter;

impl MobxAdapter {
    pub const GLOBAL: &'static str = "__MOBX_STORES__";
}

fn strip_admin_keys(value: RuntimeValue) -> RuntimeValue {
    match value {
        RuntimeValue::Object(map) => RuntimeValue::Object(
            map.into_iter()
                .filter(|(k, _)| !k.starts_with('$'))
                .map(|(k, v)| (k, strip_admin_keys(v)))
                .collect(),
        ),
        other => other,
    }
}

impl StateAdapter for MobxAdapter {
    fn name(&self) -> &str {
        "mobx"
    }

    fn is_available(&self, page: &Page) -> bool {
        page.container(Self::GLOBAL).is_some()
    }

    fn get_state(&self, page: &Page) -> Option<RuntimeValue> {
        read_container(page, Self::GLOBAL, self.name()).map(strip_admin_keys)
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct StateAdapterRegistry {
    adapters: Vec<Box<dyn StateAdapter>>,
}

impl Default for StateAdapterRegistry {
    fn default() -> Self {
        Self {
            adapters: vec![
                Box::new(ReduxAdapter),
                Box::new(ZustandAdapter),
                Box::new(JotaiAdapter),
                Box::new(MobxAdapter),
            ],
        }
    }
}

impl std::fmt::Debug for StateAdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateAdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

impl StateAdapterRegistry {
    /// A registry with no adapters at all
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Add an adapter after the built-in ones
    pub fn register(&mut self, adapter: Box<dyn StateAdapter>) -> Result<(), ContextError> {
        let name = adapter.name().trim();
        if name.is_empty() {
            return Err(ContextError::InvalidAdapter(
                "adapter name must not be empty".to_string(),
            ));
        }
        if name == CUSTOM_STATE_KEY {
            return Err(ContextError::InvalidAdapter(format!(
                "'{CUSTOM_STATE_KEY}' is reserved for caller-supplied state"
            )));
        }
        if self.adapters.iter().any(|a| a.name() == name) {
            return Err(ContextError::InvalidAdapter(format!(
                "adapter '{name}' is already registered"
            )));
        }
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Poll every available adapter, then the custom getter, and merge the
    /// redacted, cleaned results. Empty contributions are left out.
    pub fn capture_app_state(
        &self,
        page: &Page,
        custom: Option<&CustomStateGetter>,
        exclude_keys: &[String],
    ) -> CapturedAppState {
        let mut merged = BTreeMap::new();

        for adapter in &self.adapters {
            let name = adapter.name();
            let available =
                catch_unwind(AssertUnwindSafe(|| adapter.is_available(page))).unwrap_or(false);
            if !available {
                continue;
            }
            let state = catch_unwind(AssertUnwindSafe(|| adapter.get_state(page)))
                .unwrap_or_else(|_| {
                    warn!(target: "ctxsnap::state", adapter = name, "adapter panicked while reading state");
                    None
                });
            let Some(state) = state else {
                continue;
            };
            if let Some(clean) = clean_state(&redact_keys(&state, exclude_keys)) {
                merged.insert(name.to_string(), clean);
            } else {
                debug!(target: "ctxsnap::state", adapter = name, "state empty after cleaning");
            }
        }

        if let Some(getter) = custom {
            match catch_unwind(AssertUnwindSafe(getter)) {
                Ok(Ok(state)) => {
                    if let Some(clean) = clean_state(&redact_keys(&state, exclude_keys)) {
                        merged.insert(CUSTOM_STATE_KEY.to_string(), clean);
                    }
                }
                Ok(Err(e)) => {
                    warn!(target: "ctxsnap::state", error = %e, "custom state getter failed")
                }
                Err(_) => warn!(target: "ctxsnap::state", "custom state getter panicked"),
            }
        }

        CapturedAppState(merged)
    }
}

// ============================================================================
// Redaction and cleaning
// ============================================================================

/// Replace values under any of `keys` (case-insensitive) with
/// [`REDACTED_MARKER`]. Recurses into nested objects, not into arrays.
pub fn redact_keys(value: &RuntimeValue, keys: &[String]) -> RuntimeValue {
    if keys.is_empty() {
        return value.clone();
    }
    match value {
        RuntimeValue::Object(map) => RuntimeValue::Object(
            map.iter()
                .map(|(k, v)| {
                    let redacted = if keys.iter().any(|key| key.eq_ignore_ascii_case(k)) {
                        RuntimeValue::string(REDACTED_MARKER)
                    } else if v.as_object().is_some() {
                        redact_keys(v, keys)
                    } else {
                        v.clone()
                    };
                    (k.clone(), redacted)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_noise_key(key: &str) -> bool {
    NOISE_KEYS.contains(&key) || key.starts_with(INTERNAL_KEY_PREFIX)
}

/// Recursively drop empty and uninformative values: `null`, `undefined`,
/// `""`, `false`, empty arrays and objects, functions, unserializable
/// values, noise keys and internal keys. `None` when nothing is left.
pub fn clean_state(value: &RuntimeValue) -> Option<Value> {
    clean_value(value, 0)
}

const MAX_CLEAN_DEPTH: usize = 32;

fn clean_value(value: &RuntimeValue, depth: usize) -> Option<Value> {
    match value {
        RuntimeValue::Undefined
        | RuntimeValue::Null
        | RuntimeValue::Bool(false)
        | RuntimeValue::Function { .. }
        | RuntimeValue::Opaque(_) => None,
        RuntimeValue::Bool(true) => Some(Value::Bool(true)),
        RuntimeValue::Number(n) => number_to_json(*n),
        RuntimeValue::String(s) if s.is_empty() => None,
        RuntimeValue::String(s) => Some(Value::String(s.clone())),
        RuntimeValue::Array(items) => {
            if depth >= MAX_CLEAN_DEPTH {
                return None;
            }
            let out: Vec<Value> = items
                .iter()
                .filter_map(|item| clean_value(item, depth + 1))
                .collect();
            (!out.is_empty()).then_some(Value::Array(out))
        }
        RuntimeValue::Object(map) => {
            if depth >= MAX_CLEAN_DEPTH {
                return None;
            }
            let out: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !is_noise_key(k))
                .filter_map(|(k, v)| clean_value(v, depth + 1).map(|clean| (k.clone(), clean)))
                .collect();
            (!out.is_empty()).then_some(Value::Object(out))
        }
    }
}
