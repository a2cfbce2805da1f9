//! Context snapshots of UI elements for AI coding assistants
//!
//! Given a selected element on a live page, the engine records what the
//! element is, which components own it (with their sanitized props and
//! local state), what external stores hold, and recent console errors. It
//! then delivers the report to a local endpoint, or to the log when the
//! endpoint is down, and keeps a small local history.

use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub mod config;
pub mod console;
pub mod dom;
pub mod errors;
pub mod fiber;
pub mod history;
pub mod identity;
pub mod ownership;
pub mod page;
pub mod report;
pub mod sanitize;
pub mod screenshot;
pub mod shapes;
pub mod state;
#[cfg(test)]
mod tests;
pub mod transport;
pub mod value;

pub use config::SnapshotConfig;
pub use console::{ConsoleArg, ConsoleCapture, ConsoleEntry, ConsoleLevel};
pub use dom::{Document, NodeId};
pub use errors::ContextError;
pub use fiber::{Fiber, FiberTree};
pub use history::LocalHistory;
pub use identity::{extract_element_snapshot, ElementSnapshot};
pub use ownership::{
    extract_ownership_path, ComponentPathItem, NoiseFilter, OwnershipSource, OwnershipWalker,
};
pub use page::{Page, StateContainer};
pub use report::{ContextReport, EnvironmentInfo};
pub use screenshot::{ContextScreenshot, ScreenshotCapturer};
pub use shapes::ShapeTable;
pub use state::{CapturedAppState, CustomStateGetter, StateAdapter, StateAdapterRegistry};
pub use transport::{DeliveryMethod, DeliveryResult, DeliveryTransport};
pub use value::RuntimeValue;

/// Per-capture options
#[derive(Default)]
pub struct CaptureOptions {
    /// Free-text note from the user
    pub description: Option<String>,
    /// State no adapter knows about, merged under `custom`
    pub custom_state: Option<Box<CustomStateGetter>>,
    /// Keys redacted in addition to the configured ones
    pub exclude_keys: Vec<String>,
    /// Overrides `include_console` from the config
    pub include_console: Option<bool>,
}

impl CaptureOptions {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_custom_state<F>(mut self, getter: F) -> Self
    where
        F: Fn() -> anyhow::Result<RuntimeValue> + Send + Sync + 'static,
    {
        self.custom_state = Some(Box::new(getter));
        self
    }

    pub fn with_exclude_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_console(mut self, include: bool) -> Self {
        self.include_console = Some(include);
        self
    }
}

impl std::fmt::Debug for CaptureOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureOptions")
            .field("description", &self.description)
            .field("custom_state", &self.custom_state.is_some())
            .field("exclude_keys", &self.exclude_keys)
            .field("include_console", &self.include_console)
            .finish()
    }
}

/// The capture pipeline plus delivery
#[derive(Debug)]
pub struct ContextEngine {
    config: SnapshotConfig,
    adapters: StateAdapterRegistry,
    walker: OwnershipWalker,
    transport: DeliveryTransport,
    console: ConsoleCapture,
    history: LocalHistory,
}

impl ContextEngine {
    /// Engine reading console output from [`ConsoleCapture::global`]
    pub fn new(config: SnapshotConfig) -> Result<Self, ContextError> {
        let transport = DeliveryTransport::new(&config)?;
        let history = match &config.history_path {
            Some(path) => LocalHistory::open(config.history_capacity, path),
            None => LocalHistory::in_memory(config.history_capacity),
        };
        Ok(Self {
            adapters: StateAdapterRegistry::default(),
            walker: OwnershipWalker::default(),
            transport,
            console: ConsoleCapture::global().clone(),
            history,
            config,
        })
    }

    pub fn with_console(mut self, console: ConsoleCapture) -> Self {
        self.console = console;
        self
    }

    pub fn with_walker(mut self, walker: OwnershipWalker) -> Self {
        self.walker = walker;
        self
    }

    pub fn register_adapter(&mut self, adapter: Box<dyn StateAdapter>) -> Result<(), ContextError> {
        self.adapters.register(adapter)
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn console(&self) -> &ConsoleCapture {
        &self.console
    }

    pub fn history(&self) -> &LocalHistory {
        &self.history
    }

    pub fn transport(&self) -> &DeliveryTransport {
        &self.transport
    }

    pub fn clear_availability_cache(&self) {
        self.transport.clear_availability_cache();
    }

    /// Build a report for `element`.
    ///
    /// Only caller faults fail: `element` must be an element node of
    /// `document`. Everything else degrades to defaults.
    #[instrument(target = "ctxsnap", level = "debug", skip_all, fields(element = element.0))]
    pub fn capture(
        &self,
        page: &Page,
        document: &Document,
        ownership: Option<&dyn OwnershipSource>,
        element: NodeId,
        options: CaptureOptions,
    ) -> Result<ContextReport, ContextError> {
        if !document.contains(element) {
            return Err(ContextError::InvalidArgument(format!(
                "node {} does not belong to the document",
                element.0
            )));
        }
        if document.element(element).is_none() {
            return Err(ContextError::InvalidArgument(format!(
                "node {} is not an element",
                element.0
            )));
        }

        let snapshot = extract_element_snapshot(document, element);
        let component_path = self.walker.extract_ownership_path(ownership, document, element);

        let mut exclude_keys = self.config.redact_keys.clone();
        exclude_keys.extend(options.exclude_keys);
        let app_state =
            self.adapters
                .capture_app_state(page, options.custom_state.as_deref(), &exclude_keys);

        let console_entries = options
            .include_console
            .unwrap_or(self.config.include_console)
            .then(|| self.console.get_recent_entries(self.config.console_max_age()));

        debug!(
            target: "ctxsnap",
            selector = %snapshot.selector,
            components = component_path.len(),
            stores = app_state.0.len(),
            "capture complete"
        );

        Ok(report::assemble_report(
            page,
            report::generate_report_id(),
            snapshot,
            component_path,
            app_state,
            options.description,
            console_entries,
        ))
    }

    /// Deliver a report and record it in the local history
    pub async fn log_context_report(&self, report: &ContextReport) -> DeliveryResult {
        let result = self.transport.send_report(report).await;
        self.history.push(report.clone());
        info!(target: "ctxsnap", id = %report.id, method = ?result.method, "context report recorded");
        result
    }

    pub async fn capture_and_send(
        &self,
        page: &Page,
        document: &Document,
        ownership: Option<&dyn OwnershipSource>,
        element: NodeId,
        options: CaptureOptions,
    ) -> Result<(ContextReport, DeliveryResult), ContextError> {
        let report = self.capture(page, document, ownership, element, options)?;
        let result = self.log_context_report(&report).await;
        Ok((report, result))
    }

    /// Capture an image and link it to `report_id`. Returns `None` when the
    /// capturer had nothing, failed, or timed out; the report is unaffected.
    pub async fn attach_screenshot(
        &self,
        report_id: &str,
        capturer: &dyn ScreenshotCapturer,
        element: Option<NodeId>,
    ) -> Option<DeliveryResult> {
        let limit = Duration::from_millis(self.config.screenshot_timeout_ms);
        let data = match tokio::time::timeout(limit, capturer.capture(element)).await {
            Ok(Ok(Some(data))) if !data.is_empty() => data,
            Ok(Ok(_)) => {
                debug!(target: "ctxsnap", report_id, "no screenshot to attach");
                return None;
            }
            Ok(Err(e)) => {
                warn!(target: "ctxsnap", report_id, error = %e, "screenshot capture failed");
                return None;
            }
            Err(_) => {
                warn!(target: "ctxsnap", report_id, "screenshot capture timed out");
                return None;
            }
        };

        let screenshot = ContextScreenshot {
            report_id: report_id.to_string(),
            data,
        };
        Some(self.transport.send_screenshot(&screenshot).await)
    }
}
