//! The page a capture runs against: location, viewport, globals and the
//! external state containers the host exposes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::RuntimeValue;

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// An external state container reachable from a page global
pub trait StateContainer: Send + Sync {
    /// Current state. A store in a bad state reports an error instead of
    /// panicking.
    fn snapshot(&self) -> anyhow::Result<RuntimeValue>;
}

impl<F> StateContainer for F
where
    F: Fn() -> anyhow::Result<RuntimeValue> + Send + Sync,
{
    fn snapshot(&self) -> anyhow::Result<RuntimeValue> {
        self()
    }
}

/// Container whose state never changes; handy for hosts that copy state
/// out of the page up front
#[derive(Debug, Clone)]
pub struct StaticState(pub RuntimeValue);

impl StateContainer for StaticState {
    fn snapshot(&self) -> anyhow::Result<RuntimeValue> {
        Ok(self.0.clone())
    }
}

#[derive(Clone, Default)]
pub struct Page {
    pub url: String,
    pub viewport: Viewport,
    pub user_agent: String,
    globals: BTreeMap<String, RuntimeValue>,
    containers: BTreeMap<String, Arc<dyn StateContainer>>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("url", &self.url)
            .field("viewport", &self.viewport)
            .field("user_agent", &self.user_agent)
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("containers", &self.containers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Page {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn set_global(&mut self, name: &str, value: RuntimeValue) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<&RuntimeValue> {
        self.globals.get(name)
    }

    pub fn register_container(&mut self, name: &str, container: Arc<dyn StateContainer>) {
        self.containers.insert(name.to_string(), container);
    }

    pub fn container(&self, name: &str) -> Option<&Arc<dyn StateContainer>> {
        self.containers.get(name)
    }
}
